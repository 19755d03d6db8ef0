use std::io::Write;

use super::*;

fn parse(args: &[&str]) -> CliArgs {
    CliArgs::parse_from(args)
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.api.base_url.as_str(), DEFAULT_API_BASE_URL);
    assert_eq!(settings.api.timeout, Duration::from_secs(10));
    assert!(settings.api.user_agent.starts_with("lexquery/"));
    assert_eq!(settings.cache.grace_period, Duration::from_secs(60));
    assert!(settings.cache.refresh_after.is_none());
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.api.base_url = Some("http://from-file.example/api/".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = GlobalOverrides {
        api_base_url: Some("https://override.example/api/".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.api.base_url.as_str(),
        "https://override.example/api/"
    );
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn rejects_unparsable_base_url() {
    let mut raw = RawSettings::default();
    raw.api.base_url = Some("not a url".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid url");
    assert!(matches!(err, LoadError::Invalid { key: "api.base_url", .. }));
}

#[test]
fn rejects_non_http_scheme() {
    let mut raw = RawSettings::default();
    raw.api.base_url = Some("ftp://files.example/".to_string());

    let err = Settings::from_raw(raw).expect_err("ftp is not supported");
    assert!(matches!(err, LoadError::Invalid { key: "api.base_url", .. }));
}

#[test]
fn rejects_zero_timeout() {
    let mut raw = RawSettings::default();
    raw.api.timeout_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero timeout");
    assert!(matches!(err, LoadError::Invalid { key: "api.timeout_ms", .. }));
}

#[test]
fn refresh_window_must_be_positive_when_set() {
    let mut raw = RawSettings::default();
    raw.cache.refresh_after_ms = Some(0);
    assert!(Settings::from_raw(raw.clone()).is_err());

    raw.cache.refresh_after_ms = Some(30_000);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.cache.refresh_after,
        Some(Duration::from_secs(30))
    );
}

#[test]
fn zero_grace_period_is_allowed() {
    let mut raw = RawSettings::default();
    raw.cache.grace_period_ms = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.grace_period, Duration::ZERO);
}

#[test]
fn rejects_unknown_log_level() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown level");
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn load_reads_explicit_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[api]\nbase_url = \"https://backend.example/api/\"\ntimeout_ms = 2500\n\n[cache]\ngrace_period_ms = 5000"
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = parse(&["lexquery", "--config-file", &path, "events"]);
    let settings = load(&args).expect("settings load");

    assert_eq!(settings.api.base_url.as_str(), "https://backend.example/api/");
    assert_eq!(settings.api.timeout, Duration::from_millis(2500));
    assert_eq!(settings.cache.grace_period, Duration::from_secs(5));
}

#[test]
fn cli_flag_beats_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(file, "[api]\ntimeout_ms = 2500").expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = parse(&[
        "lexquery",
        "--config-file",
        &path,
        "--api-timeout-ms",
        "900",
        "events",
    ]);
    let settings = load(&args).expect("settings load");

    assert_eq!(settings.api.timeout, Duration::from_millis(900));
}

#[test]
fn missing_explicit_config_file_fails() {
    let args = parse(&[
        "lexquery",
        "--config-file",
        "/nonexistent/lexquery-test.toml",
        "events",
    ]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}

#[test]
fn parse_news_arguments() {
    let args = parse(&[
        "lexquery",
        "news",
        "--q",
        "family law",
        "--page-size",
        "5",
        "--pages",
        "2",
    ]);

    match args.command {
        Command::News(news) => {
            assert_eq!(news.q, "family law");
            assert_eq!(news.page, 1);
            assert_eq!(news.page_size, 5);
            assert_eq!(news.pages, 2);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_global_flags_after_subcommand() {
    let args = parse(&[
        "lexquery",
        "chat",
        "--prompt",
        "Hello",
        "--api-base-url",
        "http://localhost:9000/api/",
    ]);

    assert_eq!(
        args.overrides.api_base_url.as_deref(),
        Some("http://localhost:9000/api/")
    );
    match args.command {
        Command::Chat(chat) => assert_eq!(chat.prompt, "Hello"),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_ticket_lookup() {
    let args = parse(&["lexquery", "tickets", "--id", "7"]);
    match args.command {
        Command::Tickets(tickets) => assert_eq!(tickets.id, Some(7)),
        _ => panic!("wrong command parsed"),
    }
}
