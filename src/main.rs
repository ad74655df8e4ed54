use anyhow::{Context, Result, anyhow, bail};
use apicall::config::{self, Profiles};
use apicall::context::{KeyringSecrets, ProfileEnv, ProviderContext, SecretsBackend, open_secret_store, secrets_backend};
use apicall::engine::Engine;
use apicall::http_client::{DEFAULT_TIMEOUT, ReqwestTransport};
use apicall::params::ParameterBag;
use apicall::providers::SystemClock;
use apicall::registry::{Registry, split_target};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let provider_arg = || Arg::new("provider").help("Provider name").required(true);
    Command::new("api")
        .about("Declarative command runner for HTTP/JSON APIs")
        .long_about(
            "Runs provider commands such as `api replicate predictions.create version=... input='{...}'`. \
             Parameters are key=value words or -s key=value flags.",
        )
        .args_conflicts_with_subcommands(true)
        .arg(Arg::new("target")
            .help("<provider>[.<command>] [command] [key=value ...]")
            .num_args(1..))
        .arg(Arg::new("param")
            .short('s')
            .long("param")
            .help("Extra key=value parameter")
            .value_name("KEY=VALUE")
            .action(ArgAction::Append))
        .arg(Arg::new("json")
            .long("json")
            .help("Print the result as JSON")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("timeout")
            .long("timeout")
            .help("Per-request timeout in seconds")
            .value_name("SECS")
            .value_parser(clap::value_parser!(u64)))
        .arg(Arg::new("profile")
            .long("profile")
            .help("Profile to use")
            .global(true)
            .num_args(1))
        .arg(Arg::new("config")
            .long("config")
            .help("Configuration directory")
            .value_name("DIR")
            .global(true)
            .value_parser(clap::value_parser!(PathBuf)))
        .subcommand(Command::new("providers").about("List available providers"))
        .subcommand(Command::new("inspect")
            .about("Show a provider's commands and arguments")
            .arg(provider_arg()))
        .subcommand(Command::new("profile")
            .about("Manage profiles")
            .arg_required_else_help(true)
            .subcommand(Command::new("list").arg(provider_arg()))
            .subcommand(Command::new("add").arg(provider_arg()).arg(Arg::new("name").required(true)))
            .subcommand(Command::new("rm").arg(provider_arg()).arg(Arg::new("name").required(true))))
        .subcommand(Command::new("env")
            .about("Manage profile environment values")
            .arg_required_else_help(true)
            .subcommand(Command::new("set")
                .arg(provider_arg())
                .arg(Arg::new("key").required(true))
                .arg(Arg::new("value").required(true)))
            .subcommand(Command::new("unset").arg(provider_arg()).arg(Arg::new("key").required(true)))
            .subcommand(Command::new("list").arg(provider_arg())))
        .subcommand(Command::new("secret")
            .about("Manage stored credentials")
            .arg_required_else_help(true)
            .subcommand(Command::new("set")
                .arg(provider_arg())
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("value").help("Read from stdin when omitted")))
            .subcommand(Command::new("unset").arg(provider_arg()).arg(Arg::new("name").required(true)))
            .subcommand(Command::new("list").arg(provider_arg())))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let base = config::base_dir(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let registry = Registry::builtin();

    match matches.subcommand() {
        Some(("providers", _)) => {
            for name in registry.provider_names() {
                println!("{}", name);
            }
            Ok(())
        }
        Some(("inspect", sub)) => inspect(&registry, required(sub, "provider")?),
        Some(("profile", sub)) => profile_command(&registry, &base, sub),
        Some(("env", sub)) => env_command(&registry, &base, sub),
        Some(("secret", sub)) => secret_command(&registry, &base, sub),
        _ => run(registry, &base, &matches).await,
    }
}

async fn run(registry: Registry, base: &Path, matches: &ArgMatches) -> Result<()> {
    let words: Vec<String> = matches
        .get_many::<String>("target")
        .unwrap_or_default()
        .cloned()
        .collect();
    let Some((provider, command, rest)) = split_target(&words) else {
        eprintln!("No command provided. Use 'api --help' for usage information.");
        return Ok(());
    };
    registry.provider(&provider)?;

    let mut bag = ParameterBag::new();
    let flags = matches.get_many::<String>("param").unwrap_or_default();
    for pair in rest.iter().chain(flags) {
        let (key, value) = parse_pair(pair)?;
        bag.insert(key, value);
    }

    let profiles = Profiles::load(base, &provider)?;
    let (profile_name, profile) = profiles.resolve(matches.get_one::<String>("profile").map(String::as_str))?;
    info!("Running {}.{} with profile '{}'", provider, command, profile_name);
    let ctx = ProviderContext::new(
        Box::new(ProfileEnv::new(profile.env.clone())),
        open_secret_store(&provider, profile_name),
    );

    let timeout = matches
        .get_one::<u64>("timeout")
        .map(|secs| Duration::from_secs(*secs))
        .unwrap_or(DEFAULT_TIMEOUT);
    let engine = Engine::new(
        registry,
        Box::new(ReqwestTransport::new(timeout)),
        Box::new(SystemClock::new()),
    );

    let output = match engine.invoke(&provider, &command, &bag, &ctx).await {
        Ok(output) => output,
        Err(err) => {
            if let Some(body) = err.body() {
                eprintln!("{}", serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()));
            }
            return Err(err.into());
        }
    };

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&output.to_json())?);
    } else {
        println!("{}", output.render_text());
    }
    if output.timed_out() {
        eprintln!("note: job did not finish before the poll timeout; it may still complete");
    }
    Ok(())
}

fn parse_pair(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("expected key=value, got '{}'", raw),
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument '{}'", name))
}

fn inspect(registry: &Registry, provider: &str) -> Result<()> {
    for doc in registry.describe(provider)? {
        println!("{:<28} {}", doc.name, doc.description);
        if !doc.args.is_empty() {
            println!("{:<28} args: {}", "", doc.args.join(", "));
        }
    }
    Ok(())
}

fn profile_command(registry: &Registry, base: &Path, matches: &ArgMatches) -> Result<()> {
    let Some((action, sub)) = matches.subcommand() else {
        bail!("missing profile action");
    };
    let provider = required(sub, "provider")?;
    registry.provider(provider)?;
    let mut profiles = Profiles::load(base, provider)?;
    match action {
        "list" => return config::show_config_info(base, provider),
        "add" => {
            let name = required(sub, "name")?;
            profiles.add(name)?;
            println!("Added profile '{}'", name);
        }
        "rm" => {
            let name = required(sub, "name")?;
            let removed = profiles.remove(name)?;
            if secrets_backend() == SecretsBackend::Keychain {
                let store = KeyringSecrets::new(provider, name);
                for secret in &removed.secrets {
                    store.delete(secret)?;
                }
            }
            println!("Removed profile '{}'", name);
        }
        other => bail!("unknown profile action '{}'", other),
    }
    profiles.save(base, provider)
}

fn env_command(registry: &Registry, base: &Path, matches: &ArgMatches) -> Result<()> {
    let Some((action, sub)) = matches.subcommand() else {
        bail!("missing env action");
    };
    let provider = required(sub, "provider")?;
    registry.provider(provider)?;
    let mut profiles = Profiles::load(base, provider)?;
    let profile = profiles
        .resolve(matches.get_one::<String>("profile").map(String::as_str))?
        .0
        .to_string();
    match action {
        "list" => {
            for (key, value) in &profiles.profiles[&profile].env {
                println!("{}={}", key, value);
            }
            return Ok(());
        }
        "set" => profiles.upsert_env(&profile, required(sub, "key")?, required(sub, "value")?)?,
        "unset" => {
            let key = required(sub, "key")?;
            if !profiles.remove_env(&profile, key)? {
                eprintln!("'{}' was not set in profile '{}'", key, profile);
            }
        }
        other => bail!("unknown env action '{}'", other),
    }
    profiles.save(base, provider)
}

fn secret_command(registry: &Registry, base: &Path, matches: &ArgMatches) -> Result<()> {
    let Some((action, sub)) = matches.subcommand() else {
        bail!("missing secret action");
    };
    let provider = required(sub, "provider")?;
    registry.provider(provider)?;
    let mut profiles = Profiles::load(base, provider)?;
    let profile = profiles
        .resolve(matches.get_one::<String>("profile").map(String::as_str))?
        .0
        .to_string();

    if action == "list" {
        for name in &profiles.profiles[&profile].secrets {
            println!("{}", name);
        }
        return Ok(());
    }
    if secrets_backend() == SecretsBackend::Environment {
        bail!("secrets are read from environment variables while API_SECRETS_BACKEND=env");
    }

    let store = KeyringSecrets::new(provider, &profile);
    let name = required(sub, "name")?;
    match action {
        "set" => {
            let value = match sub.get_one::<String>("value") {
                Some(value) => value.clone(),
                None => read_stdin_line().context("reading secret from stdin")?,
            };
            if value.is_empty() {
                bail!("secret '{}' must not be empty", name);
            }
            store.store(name, &value)?;
            profiles.upsert_secret(&profile, name)?;
            println!("Stored secret '{}' for {}/{}", name, provider, profile);
        }
        "unset" => {
            store.delete(name)?;
            profiles.remove_secret(&profile, name)?;
            println!("Removed secret '{}' for {}/{}", name, provider, profile);
        }
        other => bail!("unknown secret action '{}'", other),
    }
    profiles.save(base, provider)
}

fn read_stdin_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
