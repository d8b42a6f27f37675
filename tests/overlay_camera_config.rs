use std::sync::Mutex;

use tempfile::NamedTempFile;

use overlay_camera::config::OverlayCameraConfig;
use overlay_camera::detect::Accuracy;
use overlay_camera::overlay::{OverlayKind, PostFilter};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "OVERLAY_CAMERA_CONFIG",
        "OVERLAY_CAMERA_SOURCE",
        "OVERLAY_CAMERA_FPS",
        "OVERLAY_CAMERA_ASPECT_RATIO",
        "OVERLAY_CAMERA_OUTPUT_DIR",
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
                "source": "/dev/video2",
                "target_fps": 24
            },
            "detector": {
                "backend": "scripted",
                "accuracy": "low",
                "aspect_tolerance": 0.1,
                "max_features": 3
            },
            "overlay": {
                "kind": { "kind": "solid", "rgba": [255, 0, 0, 200] },
                "pixelate": 8,
                "seed": 7,
                "post_filter": "sepia"
            },
            "display": {
                "width": 320,
                "height": 480,
                "scale": 1,
                "every_nth": 5
            }
        }"#,
    );

    std::env::set_var("OVERLAY_CAMERA_CONFIG", file.path());
    std::env::set_var("OVERLAY_CAMERA_SOURCE", "stub://bench?size=640x480");
    std::env::set_var("OVERLAY_CAMERA_ASPECT_RATIO", "1.4");
    std::env::set_var("OVERLAY_CAMERA_OUTPUT_DIR", "/tmp/overlay-frames");

    let cfg = OverlayCameraConfig::load().expect("load config");

    assert_eq!(cfg.camera.uri, "stub://bench?size=640x480");
    assert_eq!(cfg.camera.target_fps, 24);
    assert_eq!(cfg.detector_backend, "scripted");
    assert_eq!(cfg.detector.accuracy, Accuracy::Low);
    assert_eq!(cfg.detector.aspect_ratio, 1.4);
    assert_eq!(cfg.detector.aspect_tolerance, 0.1);
    assert_eq!(cfg.detector.max_features, 3);
    assert_eq!(
        cfg.overlay.kind,
        OverlayKind::Solid {
            rgba: [255, 0, 0, 200]
        }
    );
    assert_eq!(cfg.overlay.pixelate, Some(8));
    assert_eq!(cfg.overlay.seed, Some(7));
    assert_eq!(cfg.overlay.post_filter, Some(PostFilter::Sepia));
    assert_eq!(cfg.display.width, 320.0);
    assert_eq!(cfg.display.height, 480.0);
    assert_eq!(cfg.display.scale, 1.0);
    assert_eq!(cfg.display.every_nth, 5);
    assert_eq!(
        cfg.display.output_dir.as_deref(),
        Some(std::path::Path::new("/tmp/overlay-frames"))
    );

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = OverlayCameraConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.uri, "stub://camera");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.detector_backend, "contour");
    assert_eq!(cfg.detector.aspect_ratio, 1.5);
    assert_eq!(cfg.overlay.kind, OverlayKind::Noise);
    assert!(cfg.overlay.post_filter.is_none());
    assert!(cfg.display.output_dir.is_none());

    clear_env();
}

#[test]
fn rejects_invalid_env_and_file_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("OVERLAY_CAMERA_FPS", "fast");
    assert!(OverlayCameraConfig::load().is_err());
    std::env::set_var("OVERLAY_CAMERA_FPS", "0");
    assert!(OverlayCameraConfig::load().is_err());
    clear_env();

    std::env::set_var("OVERLAY_CAMERA_ASPECT_RATIO", "-1.5");
    assert!(OverlayCameraConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "detector": { "accuracy": "medium" } }"#);
    assert!(OverlayCameraConfig::load_from(Some(file.path())).is_err());

    let file = write_config(r#"{ "display": { "every_nth": 0 } }"#);
    assert!(OverlayCameraConfig::load_from(Some(file.path())).is_err());

    let file = write_config("not json");
    let err = OverlayCameraConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
