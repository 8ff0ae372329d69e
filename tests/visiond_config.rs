use std::sync::Mutex;

use clap::Parser;
use tempfile::NamedTempFile;

use vision_relay::config::{Cli, VisiondConfig};
use vision_relay::{CoordinateSpace, PixelOrder};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VISIOND_CONFIG",
        "VISIOND_CAMERA_DEVICE",
        "VISIOND_WEB_ADDR",
        "VISIOND_DETECT_BACKEND",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": {
                "device": "/dev/video2",
                "width": 1280,
                "height": 720,
                "pixel_order": "bgr"
            },
            "detect": {
                "enabled": true,
                "backend": "stub",
                "box_space": "display"
            },
            "web": {
                "enabled": false,
                "addr": "0.0.0.0:9000"
            }
        }"#,
    );

    std::env::set_var("VISIOND_CONFIG", file.path());
    std::env::set_var("VISIOND_CAMERA_DEVICE", "stub://bench");
    std::env::set_var("VISIOND_WEB_ADDR", "127.0.0.1:8081");

    let cli = Cli::try_parse_from(["visiond", "--web"]).expect("parse cli");
    assert_eq!(cli.config.as_deref(), Some(file.path()));
    let cfg = VisiondConfig::load(&cli).expect("load config");

    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.pixel_order, PixelOrder::Bgr);
    assert!(cfg.detect.enabled);
    assert_eq!(cfg.detect.backend, "stub");
    assert_eq!(cfg.detect.box_space, Some(CoordinateSpace::Display));
    assert!(cfg.web.enabled);
    assert_eq!(cfg.web.addr, "127.0.0.1:8081");

    clear_env();
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VisiondConfig::load(&Cli::default()).expect("load defaults");
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!((cfg.camera.width, cfg.camera.height), (720, 480));
    assert!(!cfg.detect.enabled);
    assert!(!cfg.web.enabled);
    assert_eq!(cfg.web.addr, "0.0.0.0:8080");
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let zero = write_config(r#"{"camera":{"width":0}}"#);
    let cli = Cli {
        config: Some(zero.path().to_path_buf()),
        ..Cli::default()
    };
    let err = VisiondConfig::load(&cli).unwrap_err();
    assert!(err.to_string().contains("nonzero"));

    let unknown_field = write_config(r#"{"camera":{"fps":30}}"#);
    let cli = Cli {
        config: Some(unknown_field.path().to_path_buf()),
        ..Cli::default()
    };
    assert!(VisiondConfig::load(&cli).is_err());

    std::env::set_var("VISIOND_DETECT_BACKEND", "rknn");
    assert!(VisiondConfig::load(&Cli::default()).is_err());
    std::env::remove_var("VISIOND_DETECT_BACKEND");

    std::env::set_var("VISIOND_WEB_ADDR", "localhost");
    assert!(VisiondConfig::load(&Cli::default()).is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cli = Cli {
        config: Some("/nonexistent/visiond.json".into()),
        ..Cli::default()
    };
    let err = VisiondConfig::load(&cli).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
