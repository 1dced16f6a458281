use super::*;

#[test]
fn defaults_match_storefront_deployment() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), DEFAULT_PUBLIC_PORT);
    assert_eq!(settings.server.admin_addr.port(), DEFAULT_ADMIN_PORT);
    assert_eq!(settings.server.tracked_clients.get(), DEFAULT_TRACKED_CLIENTS);
    assert_eq!(
        settings.server.retained_notifications.get(),
        DEFAULT_RETAINED_NOTIFICATIONS
    );
    assert_eq!(settings.upstream.base_url.as_str(), "http://127.0.0.1:5000/");
    assert_eq!(settings.worker.static_partition, "static-v1");
    assert_eq!(settings.worker.dynamic_partition, "dynamic-v1");
    assert_eq!(settings.worker.precache.len(), DEFAULT_PRECACHE.len());
    assert_eq!(settings.worker.sync_tag, "background-sync");
    assert_eq!(settings.worker.notification, NotificationConfig::default());
}

#[test]
fn scope_defaults_to_public_listener() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(8080);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.worker.scope.as_str(), "http://127.0.0.1:8080/");
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.upstream.url = Some("http://api.internal:5000".to_string());

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        upstream: UpstreamOverrides {
            upstream_url: Some("https://shop.example".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.upstream.base_url.as_str(), "https://shop.example/");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn file_layer_is_overridden_by_later_sources() {
    let raw: RawSettings = Config::builder()
        .add_source(File::from_str(
            r#"
            [server]
            public_port = 4000

            [worker]
            static_partition = "static-v2"
            api_patterns = ["^/catalogue/"]
            "#,
            config::FileFormat::Toml,
        ))
        .set_override("server.public_port", 4500)
        .expect("override")
        .build()
        .expect("build")
        .try_deserialize()
        .expect("deserialize");

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4500);
    assert_eq!(settings.worker.static_partition, "static-v2");
    assert_eq!(settings.worker.api_patterns.len(), 1);
    assert!(settings.worker.matches_api("/catalogue/implants"));
}

#[test]
fn invalid_api_pattern_is_rejected() {
    let mut raw = RawSettings::default();
    raw.worker.api_patterns = Some(vec!["/api/(products".to_string()]);

    let err = Settings::from_raw(raw).expect_err("pattern must compile");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "worker.api_patterns",
            ..
        }
    ));
}

#[test]
fn precache_paths_must_be_absolute() {
    let mut raw = RawSettings::default();
    raw.worker.precache = Some(vec!["/".to_string(), "boutique".to_string()]);

    let err = Settings::from_raw(raw).expect_err("relative path");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "worker.precache",
            ..
        }
    ));
}

#[test]
fn partitions_must_differ() {
    let mut raw = RawSettings::default();
    raw.worker.static_partition = Some("v1".to_string());
    raw.worker.dynamic_partition = Some(" v1 ".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn upstream_must_be_http() {
    let mut raw = RawSettings::default();
    raw.upstream.url = Some("ftp://files.example".to_string());

    let err = Settings::from_raw(raw).expect_err("bad scheme");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "upstream.url",
            ..
        }
    ));
}

#[test]
fn zero_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.upstream.timeout_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.server.max_body_bytes = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.server.admin_port = Some(DEFAULT_PUBLIC_PORT);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.server.tracked_clients = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero client limit");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "server.tracked_clients",
            ..
        }
    ));
}

#[test]
fn notification_fields_can_be_overridden() {
    let mut raw = RawSettings::default();
    raw.notification.title = Some("DentalTech Pro Staging".to_string());
    raw.notification.open_url = Some("/boutique".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.worker.notification.title, "DentalTech Pro Staging");
    assert_eq!(settings.worker.notification.open_url, "/boutique");
    assert_eq!(settings.worker.notification.vibrate, vec![100, 50, 100]);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["storefront-offline"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "storefront-offline",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--upstream-url",
        "http://flask:5000",
        "--log-json",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.upstream.upstream_url.as_deref(),
                Some("http://flask:5000")
            );
            assert_eq!(serve.overrides.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_precache_arguments() {
    let args = CliArgs::parse_from([
        "storefront-offline",
        "precache",
        "--upstream-timeout-seconds",
        "3",
    ]);

    match args.command.expect("precache command") {
        Command::Precache(precache) => {
            assert_eq!(precache.upstream.upstream_timeout_seconds, Some(3));
        }
        _ => panic!("wrong command parsed"),
    }
}
