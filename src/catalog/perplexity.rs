use crate::params::{BoolPolicy, FieldKind, FieldSpec};
use crate::registry::DEFAULT_COMMAND;
use crate::schema::{AuthSpec, BaseUrlSpec, CommandDescriptor, ProviderSpec};

const SONAR_ARGS: &[&str] = &[
    "q",
    "model",
    "system",
    "messages",
    "search_mode",
    "temperature",
    "top_p",
    "max_tokens",
    "return_images",
    "return_related_questions",
    "search_domain_filter",
    "search_recency_filter",
    "search_after_date_filter",
    "search_before_date_filter",
    "last_updated_after_filter",
    "last_updated_before_filter",
];

/// Chat-completion body shared by `ask` and `deep`; `extra` lands after `search_mode`.
fn sonar_body(model: &str, extra: Vec<FieldSpec>) -> Vec<FieldSpec> {
    let mut fields = vec![
        FieldSpec::string("model").or_value(model),
        FieldSpec::messages(),
        FieldSpec::string("search_mode").or_value("web"),
    ];
    fields.extend(extra);
    fields.extend([
        FieldSpec::number("temperature").or_value(0.2),
        FieldSpec::number("top_p").or_value(0.9),
        FieldSpec::number("max_tokens"),
        FieldSpec::flag("return_images", BoolPolicy::FalseWhenAbsent),
        FieldSpec::flag("return_related_questions", BoolPolicy::FalseWhenAbsent),
        FieldSpec::json("search_domain_filter"),
        FieldSpec::string("search_recency_filter"),
        FieldSpec::string("search_after_date_filter"),
        FieldSpec::string("search_before_date_filter"),
        FieldSpec::string("last_updated_after_filter"),
        FieldSpec::string("last_updated_before_filter"),
    ]);
    fields
}

pub fn provider() -> ProviderSpec {
    let mut deep_args = SONAR_ARGS.to_vec();
    deep_args.insert(5, "reasoning_effort");

    ProviderSpec::new(
        "perplexity",
        BaseUrlSpec::new("PERPLEXITY_BASE_URL", "https://api.perplexity.ai"),
    )
    .auth(AuthSpec::bearer("token"))
    .command(
        CommandDescriptor::post("search", "Perplexity search", "/search")
            .args(&[
                "q",
                "query",
                "max_results",
                "max_tokens",
                "max_tokens_per_page",
                "search_domain_filter",
                "country",
                "search_recency_filter",
                "search_after_date",
                "search_before_date",
            ])
            .body(vec![
                // `q` is plain text; `query` may be a JSON array of queries.
                FieldSpec::string("q")
                    .key("query")
                    .or_param("query", FieldKind::Json)
                    .or_value(""),
                FieldSpec::number("max_results"),
                FieldSpec::number("max_tokens"),
                FieldSpec::number("max_tokens_per_page"),
                FieldSpec::json("search_domain_filter"),
                FieldSpec::string("country"),
                FieldSpec::string("search_recency_filter"),
                FieldSpec::string("search_after_date"),
                FieldSpec::string("search_before_date"),
            ]),
    )
    .command(
        CommandDescriptor::post("ask", "Chat completion with sonar", "/chat/completions")
            .args(SONAR_ARGS)
            .body(sonar_body("sonar-pro", Vec::new())),
    )
    // `api perplexity q=...` with no command name runs an `ask`.
    .command(
        CommandDescriptor::post(DEFAULT_COMMAND, "Same as ask", "/chat/completions")
            .args(SONAR_ARGS)
            .body(sonar_body("sonar-pro", Vec::new())),
    )
    .command(
        CommandDescriptor::post("deep", "Deep research chat completion", "/chat/completions")
            .args(&deep_args)
            .body(sonar_body(
                "sonar-deep-research",
                vec![FieldSpec::string("reasoning_effort").or_value("medium")],
            )),
    )
}
