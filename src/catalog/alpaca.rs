use crate::params::{BoolPolicy, FieldSpec};
use crate::schema::{AuthSpec, BaseUrlSpec, CommandDescriptor, ProviderSpec};

const DATA: &str = "data";

pub fn provider() -> ProviderSpec {
    ProviderSpec::new(
        "alpaca",
        BaseUrlSpec::new("ALPACA_BASE_URL", "https://paper-api.alpaca.markets").alias("ALPACA_ENDPOINT"),
    )
    .base(DATA, BaseUrlSpec::new("ALPACA_DATA_BASE_URL", "https://data.alpaca.markets"))
    .auth(AuthSpec::headers(&[
        ("APCA-API-KEY-ID", "key"),
        ("APCA-API-SECRET-KEY", "secret"),
    ]))
    .command(CommandDescriptor::get("account.get", "Get account details", "/v2/account"))
    .command(
        CommandDescriptor::get("assets.list", "List assets", "/v2/assets")
            .args(&["status", "asset_class", "exchange"])
            .query(vec![
                FieldSpec::string("status"),
                FieldSpec::string("asset_class"),
                FieldSpec::string("exchange"),
            ]),
    )
    .command(CommandDescriptor::get("assets.get", "Get asset by id or symbol", "/v2/assets/{id}").args(&["id"]))
    .command(CommandDescriptor::get("clock", "Get market clock", "/v2/clock"))
    .command(
        CommandDescriptor::get("calendar", "Get market calendar", "/v2/calendar")
            .args(&["start", "end"])
            .query(vec![FieldSpec::string("start"), FieldSpec::string("end")]),
    )
    .command(
        CommandDescriptor::get("orders.list", "List orders", "/v2/orders")
            .args(&["status", "limit", "after", "until", "direction", "nested"])
            .query(vec![
                FieldSpec::string("status"),
                FieldSpec::number("limit"),
                FieldSpec::string("after"),
                FieldSpec::string("until"),
                FieldSpec::string("direction"),
                FieldSpec::flag("nested", BoolPolicy::OmitWhenAbsent),
            ]),
    )
    .command(CommandDescriptor::get("orders.get", "Get an order", "/v2/orders/{id}").args(&["id"]))
    // Quantities and prices stay strings: the API takes decimal strings.
    .command(
        CommandDescriptor::post("orders.create", "Create an order", "/v2/orders")
            .args(&[
                "symbol",
                "qty",
                "notional",
                "side",
                "type",
                "time_in_force",
                "limit_price",
                "stop_price",
                "trail_price",
                "trail_percent",
                "extended_hours",
                "client_order_id",
                "order_class",
                "take_profit",
                "stop_loss",
            ])
            .body(vec![
                FieldSpec::string("symbol"),
                FieldSpec::string("qty"),
                FieldSpec::string("notional"),
                FieldSpec::string("side").or_value("buy"),
                FieldSpec::string("type").or_value("market"),
                FieldSpec::string("time_in_force").or_value("day"),
                FieldSpec::string("limit_price"),
                FieldSpec::string("stop_price"),
                FieldSpec::string("trail_price"),
                FieldSpec::string("trail_percent"),
                FieldSpec::flag("extended_hours", BoolPolicy::FalseWhenAbsent),
                FieldSpec::string("client_order_id"),
                FieldSpec::string("order_class"),
                FieldSpec::json("take_profit"),
                FieldSpec::json("stop_loss"),
            ]),
    )
    .command(
        CommandDescriptor::patch("orders.replace", "Replace an order", "/v2/orders/{id}")
            .args(&["id", "qty", "time_in_force", "limit_price", "stop_price", "trail", "client_order_id"])
            .body(vec![
                FieldSpec::string("qty"),
                FieldSpec::string("time_in_force"),
                FieldSpec::string("limit_price"),
                FieldSpec::string("stop_price"),
                FieldSpec::string("trail"),
                FieldSpec::string("client_order_id"),
            ]),
    )
    .command(CommandDescriptor::delete("orders.cancel", "Cancel an order", "/v2/orders/{id}").args(&["id"]))
    .command(CommandDescriptor::get("positions.list", "List positions", "/v2/positions"))
    .command(CommandDescriptor::get("positions.get", "Get a position", "/v2/positions/{symbol}").args(&["symbol"]))
    .command(
        CommandDescriptor::delete("positions.close", "Close a position", "/v2/positions/{symbol}").args(&["symbol"]),
    )
    .command(
        CommandDescriptor::get("activities.list", "List account activities", "/v2/account/activities")
            .args(&["activity_types", "date", "until", "after", "direction", "page_size", "page_token"])
            .query(vec![
                FieldSpec::string("activity_types"),
                FieldSpec::string("date"),
                FieldSpec::string("until"),
                FieldSpec::string("after"),
                FieldSpec::string("direction"),
                FieldSpec::number("page_size"),
                FieldSpec::string("page_token"),
            ]),
    )
    .command(CommandDescriptor::get("watchlists.list", "List watchlists", "/v2/watchlists"))
    .command(CommandDescriptor::get("watchlists.get", "Get a watchlist", "/v2/watchlists/{id}").args(&["id"]))
    .command(
        CommandDescriptor::post("watchlists.create", "Create a watchlist", "/v2/watchlists")
            .args(&["name", "symbols"])
            .body(vec![FieldSpec::string("name"), FieldSpec::list("symbols")]),
    )
    .command(
        CommandDescriptor::post("watchlists.add", "Add a symbol to a watchlist", "/v2/watchlists/{id}")
            .args(&["id", "symbol"])
            .body(vec![FieldSpec::string("symbol")]),
    )
    .command(
        CommandDescriptor::delete("watchlists.delete", "Delete a watchlist", "/v2/watchlists/{id}").args(&["id"]),
    )
    .command(
        CommandDescriptor::get("data.stocks.quote", "Get latest stock quote", "/v2/stocks/{symbol}/quotes/latest")
            .base(DATA)
            .args(&["symbol"]),
    )
    .command(
        CommandDescriptor::get("data.stocks.trade", "Get latest stock trade", "/v2/stocks/{symbol}/trades/latest")
            .base(DATA)
            .args(&["symbol"]),
    )
    .command(
        CommandDescriptor::get("data.stocks.bars", "Get stock bars", "/v2/stocks/{symbol}/bars")
            .base(DATA)
            .args(&["symbol", "timeframe", "start", "end", "limit", "adjustment"])
            .query(vec![
                FieldSpec::string("timeframe").or_value("1Day"),
                FieldSpec::string("start"),
                FieldSpec::string("end"),
                FieldSpec::number("limit"),
                FieldSpec::string("adjustment"),
            ]),
    )
}
