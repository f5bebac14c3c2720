use std::io::Write;

use clap::Parser;

use serial_test::serial;

use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.resolver.batch, BatchSettings::default());
    assert_eq!(settings.resolver.label_properties.len(), 3);
    assert_eq!(settings.resolver.type_properties, vec![RDF_TYPE.to_string()]);
    assert_eq!(settings.resolver.languages.effective().as_str(), "en");
    assert_eq!(settings.cache, CacheConfig::default());
    assert!(settings.remote.peers.is_empty());
    assert_eq!(settings.data.default_repository, DEFAULT_REPOSITORY);

    let fallback = Settings::default();
    assert_eq!(fallback.server.addr, settings.server.addr);
    assert_eq!(fallback.resolver.languages, settings.resolver.languages);
    assert_eq!(
        fallback.resolver.description_properties,
        settings.resolver.description_properties
    );
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        common: CommonOverrides {
            log_level: Some("debug".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = CommonOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_common_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn empty_language_list_is_rejected() {
    let mut raw = RawSettings::default();
    raw.resolver.languages = Some(Vec::new());

    let err = Settings::from_raw(raw).expect_err("empty languages");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "resolver.languages",
            ..
        }
    ));
}

#[test]
fn zero_batch_size_is_rejected() {
    let mut raw = RawSettings::default();
    raw.resolver.batch_size = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero batch size");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "resolver.batch_size",
            ..
        }
    ));
}

#[test]
fn peers_default_to_text_capabilities() {
    let mut raw = RawSettings::default();
    raw.remote.peers.push(RawPeerSettings {
        name: "upstream".to_string(),
        url: "http://127.0.0.1:4000".to_string(),
        timeout_seconds: None,
        capabilities: None,
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    let peer = &settings.remote.peers[0];

    assert_eq!(peer.timeout, Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS));
    assert!(peer.capabilities.labels);
    assert!(peer.capabilities.descriptions);
    assert!(!peer.capabilities.types);
}

#[test]
fn peers_cannot_serve_types() {
    let mut raw = RawSettings::default();
    raw.remote.peers.push(RawPeerSettings {
        name: "upstream".to_string(),
        url: "http://127.0.0.1:4000".to_string(),
        timeout_seconds: None,
        capabilities: Some(vec!["type".to_string()]),
    });

    let err = Settings::from_raw(raw).expect_err("type capability");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "remote.peers.capabilities",
            ..
        }
    ));
}

#[test]
fn parse_resolve_arguments() {
    let args = CliArgs::parse_from([
        "glossa",
        "resolve",
        "--repository",
        "museum",
        "--kind",
        "description",
        "--language",
        "de",
        "--languages",
        "en,fr",
        "urn:a",
        "urn:b",
    ]);

    match args.command.expect("resolve command") {
        Command::Resolve(resolve) => {
            assert_eq!(resolve.repository.as_deref(), Some("museum"));
            assert_eq!(resolve.kind, ResolveKind::Description);
            assert_eq!(resolve.language.as_deref(), Some("de"));
            assert_eq!(
                resolve.common.languages,
                Some(vec!["en".to_string(), "fr".to_string()])
            );
            assert_eq!(resolve.ids, vec!["urn:a", "urn:b"]);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["glossa"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
#[serial]
fn file_then_env_then_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[resolver]\nbatch_size = 200\nbatch_workers = 3\n\n[server]\nport = 4100\n"
    )
    .expect("write config");

    // SAFETY: the test is serialized and restores the variable before returning.
    unsafe { std::env::set_var("GLOSSA__RESOLVER__BATCH_WORKERS", "7") };
    let args = CliArgs::parse_from([
        "glossa",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "serve",
        "--server-port",
        "4200",
    ]);
    let loaded = load(&args);
    unsafe { std::env::remove_var("GLOSSA__RESOLVER__BATCH_WORKERS") };

    let settings = loaded.expect("valid settings");
    assert_eq!(settings.resolver.batch.batch_size, 200);
    assert_eq!(settings.resolver.batch.workers, 7);
    assert_eq!(settings.server.addr.port(), 4200);
}
