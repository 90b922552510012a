use serial_test::serial;

use super::*;

#[test]
fn defaults_resolve_without_any_sources() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:8000");
    assert_eq!(settings.jobs.summarize_concurrency.get(), 2);
    assert_eq!(settings.jobs.retention, Duration::from_secs(24 * 3600));
    assert_eq!(settings.llm.api_base, "https://api.openai.com/v1");
    assert_eq!(settings.llm.model, "gpt-4o-mini");
    assert_eq!(settings.llm.max_tokens.get(), 2000);
    assert!((settings.llm.temperature - 0.3).abs() < f32::EPSILON);
    assert_eq!(settings.storage.directory, PathBuf::from("job_data"));
    assert_eq!(settings.rate_limit.max_uploads.get(), 30);
    assert!(settings.database.url.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.llm.model = Some("gpt-4o".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        worker: WorkerOverrides {
            logging: LoggingOverrides {
                log_level: Some("debug".to_string()),
                ..Default::default()
            },
            llm_model: Some("local-model".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.llm.model, "local-model");
}

#[test]
fn uploads_limit_defaults_to_10_mib() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(
        settings.uploads.max_request_bytes.get(),
        DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
    );
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = WorkerOverrides {
        logging: LoggingOverrides {
            log_json: Some(true),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_worker_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_values_are_rejected_with_their_key() {
    let mut raw = RawSettings::default();
    raw.llm.endpoint_concurrency = Some(0);

    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, .. }) => assert_eq!(key, "llm.endpoint_concurrency"),
        other => panic!("expected invalid endpoint concurrency, got {other:?}"),
    }
}

#[test]
fn temperature_outside_range_is_rejected() {
    let mut raw = RawSettings::default();
    raw.llm.temperature = Some(3.5);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "llm.temperature",
            ..
        })
    ));
}

#[test]
fn api_base_trailing_slash_is_trimmed() {
    let mut raw = RawSettings::default();
    raw.llm.api_base = Some("http://localhost:11434/v1/".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.llm.api_base, "http://localhost:11434/v1");
}

#[test]
fn api_key_falls_back_to_openai_variable() {
    let mut raw = RawSettings::default();
    raw.apply_api_key_fallback(|name| {
        (name == API_KEY_FALLBACK_VAR).then(|| "sk-fallback".to_string())
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.llm.api_key.as_deref(), Some("sk-fallback"));
}

#[test]
fn configured_api_key_wins_over_fallback() {
    let mut raw = RawSettings::default();
    raw.llm.api_key = Some("sk-configured".to_string());
    raw.apply_api_key_fallback(|_| Some("sk-fallback".to_string()));

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.llm.api_key.as_deref(), Some("sk-configured"));
}

#[test]
fn api_key_is_redacted_in_debug_output() {
    let mut raw = RawSettings::default();
    raw.llm.api_key = Some("sk-secret".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");

    let rendered = format!("{:?}", settings.llm);
    assert!(!rendered.contains("sk-secret"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
#[serial]
fn environment_variables_override_defaults() {
    // SAFETY: serialized with the other environment tests in this module.
    unsafe {
        std::env::set_var("INTROSPECTOR__LLM__MODEL", "env-model");
        std::env::set_var("INTROSPECTOR__JOBS__RETENTION_HOURS", "6");
        std::env::set_var("OPENAI_API_KEY", "sk-env");
    }

    let args = CliArgs::parse_from(["introspector"]);
    let result = load(&args);

    unsafe {
        std::env::remove_var("INTROSPECTOR__LLM__MODEL");
        std::env::remove_var("INTROSPECTOR__JOBS__RETENTION_HOURS");
        std::env::remove_var("OPENAI_API_KEY");
    }

    let settings = result.expect("valid settings");
    assert_eq!(settings.llm.model, "env-model");
    assert_eq!(settings.jobs.retention, Duration::from_secs(6 * 3600));
    assert_eq!(settings.llm.api_key.as_deref(), Some("sk-env"));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["introspector"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "introspector",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--rate-limit-max-uploads",
        "5",
        "--no-workers",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.worker.database.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.rate_limit_max_uploads, Some(5));
            assert!(serve.overrides.no_workers);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_worker_arguments() {
    let args = CliArgs::parse_from([
        "introspector",
        "worker",
        "--jobs-summarize-concurrency",
        "6",
        "--llm-api-base",
        "http://localhost:8080/v1",
    ]);

    match args.command.expect("worker command") {
        Command::Worker(worker) => {
            assert_eq!(worker.overrides.jobs_summarize_concurrency, Some(6));
            assert_eq!(
                worker.overrides.llm_api_base.as_deref(),
                Some("http://localhost:8080/v1")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from([
        "introspector",
        "migrate",
        "--database-url",
        "postgres://example",
    ]);

    match args.command.expect("migrate command") {
        Command::Migrate(migrate) => {
            assert_eq!(
                migrate.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
