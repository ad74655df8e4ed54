use crate::params::FieldSpec;
use crate::schema::{AuthSpec, BaseUrlSpec, CommandDescriptor, HeaderSpec, PollSpec, ProviderSpec};

pub fn provider() -> ProviderSpec {
    ProviderSpec::new(
        "replicate",
        BaseUrlSpec::new("REPLICATE_BASE_URL", "https://api.replicate.com/v1"),
    )
    .auth(AuthSpec::bearer("token"))
    .command(
        CommandDescriptor::get("search", "Search models, collections, docs", "/search")
            .args(&["q", "limit"])
            .query(vec![FieldSpec::string("q").key("query"), FieldSpec::number("limit")])
            .json_response(),
    )
    .command(
        CommandDescriptor::get("models.list", "List models", "/models")
            .args(&["cursor", "sort_by", "sort_direction"])
            .query(vec![
                FieldSpec::string("cursor"),
                FieldSpec::string("sort_by"),
                FieldSpec::string("sort_direction"),
            ])
            .json_response(),
    )
    .command(
        CommandDescriptor::get("models.get", "Get model", "/models/{owner}/{name}")
            .args(&["owner", "name"])
            .json_response(),
    )
    .command(
        CommandDescriptor::get("models.examples", "List model examples", "/models/{owner}/{name}/examples")
            .args(&["owner", "name"])
            .json_response(),
    )
    .command(
        CommandDescriptor::get("models.versions", "List model versions", "/models/{owner}/{name}/versions")
            .args(&["owner", "name"])
            .json_response(),
    )
    .command(
        CommandDescriptor::get(
            "models.version",
            "Get model version",
            "/models/{owner}/{name}/versions/{version}",
        )
        .args(&["owner", "name", "version"])
        .json_response(),
    )
    .command(
        CommandDescriptor::post("predictions.create", "Create prediction", "/predictions")
            .args(&["version", "input", "wait", "cancel_after", "webhook", "webhook_events_filter"])
            .body(vec![
                FieldSpec::string("version"),
                FieldSpec::json("input"),
                FieldSpec::string("webhook"),
                FieldSpec::json("webhook_events_filter"),
            ])
            .header(HeaderSpec::prefer_wait("wait"))
            .header(HeaderSpec::param("Cancel-After", "cancel_after"))
            .json_response(),
    )
    .command(
        CommandDescriptor::get("predictions.get", "Get prediction", "/predictions/{id}")
            .args(&["id"])
            .json_response(),
    )
    .command(
        CommandDescriptor::post("predictions.cancel", "Cancel prediction", "/predictions/{id}/cancel")
            .args(&["id"])
            .json_response(),
    )
    .command(
        CommandDescriptor::get("predictions.wait", "Poll prediction until done", "/predictions/{id}")
            .args(&["id", "poll_ms", "timeout_s"])
            .poll(PollSpec::new("/predictions/{id}"))
            .json_response(),
    )
}
