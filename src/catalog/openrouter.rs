use crate::params::{BoolPolicy, FieldSpec};
use crate::schema::{AuthSpec, BaseUrlSpec, CommandDescriptor, ProviderSpec};

pub fn provider() -> ProviderSpec {
    ProviderSpec::new(
        "openrouter",
        BaseUrlSpec::new("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
    )
    .auth(
        AuthSpec::bearer("token")
            .with_metadata("HTTP-Referer", "OPENROUTER_REFERER")
            .with_metadata("X-Title", "OPENROUTER_TITLE"),
    )
    .command(
        CommandDescriptor::post("chat", "Chat completion", "/chat/completions")
            .args(&["q", "model", "system", "messages", "temperature", "top_p", "max_tokens", "stream"])
            .body(vec![
                FieldSpec::string("model")
                    .or_env("OPENROUTER_MODEL")
                    .or_value("openai/gpt-4o-mini"),
                FieldSpec::messages(),
                FieldSpec::number("temperature"),
                FieldSpec::number("top_p"),
                FieldSpec::number("max_tokens"),
                FieldSpec::flag("stream", BoolPolicy::FalseWhenAbsent),
            ]),
    )
    .command(CommandDescriptor::get("models.list", "List models", "/models"))
}
