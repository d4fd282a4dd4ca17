//! Integration tests for plantview CLI
//!
//! These tests drive the commands end to end with a stub engine in place
//! of the Java runtime.

use std::fs;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use tempfile::TempDir;

use plantview_cli::{
    check_command, copy_command, render_command, watch_command, RenderOptions, ReportFormat,
    Session,
};
use plantview_render::{
    Capabilities, OutputFormat, PreviewStatus, QualityOptions, QualityPreset, RenderBridge,
    RenderError, Settings,
};

/// Engine stand-in: a small PNG or SVG per call, or a syntax error when the
/// source asks for one
#[derive(Default)]
struct StubBridge {
    calls: AtomicUsize,
}

impl StubBridge {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn stub_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

impl RenderBridge for StubBridge {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn render(
        &self,
        source: &str,
        format: OutputFormat,
        _quality: &QualityOptions,
    ) -> plantview_render::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if source.contains("BROKEN") {
            return Err(RenderError::Render("Syntax Error? (line 2)".to_string()));
        }
        Ok(match format {
            OutputFormat::Png => stub_png(12, 8),
            OutputFormat::Svg => {
                br#"<svg xmlns="http://www.w3.org/2000/svg" width="12" height="8"></svg>"#.to_vec()
            }
        })
    }
}

fn session_with(settings: Settings, capabilities: Capabilities) -> (Session, Arc<StubBridge>) {
    let bridge = Arc::new(StubBridge::default());
    let session = Session::new(settings, bridge.clone(), capabilities);
    (session, bridge)
}

fn session() -> (Session, Arc<StubBridge>) {
    session_with(Settings::default(), Capabilities::png_only())
}

#[tokio::test]
async fn test_render_writes_next_to_input() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("sequence.puml");
    fs::write(&input, "Alice -> Bob: hello").unwrap();

    let (mut session, bridge) = session();
    session.start().await.unwrap();
    let output = render_command(&mut session, &input, None).await.unwrap();

    assert_eq!(output, temp_dir.path().join("sequence.png"));
    let bytes = fs::read(&output).unwrap();
    assert_eq!(&bytes[0..4], &[0x89, 0x50, 0x4E, 0x47]);
    assert_eq!(session.preview().display_size(), Some((12, 8)));
    assert_eq!(bridge.calls(), 1);
}

#[tokio::test]
async fn test_render_failure_reports_diagnostic() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("broken.puml");
    fs::write(&input, "@startuml\nBROKEN ->\n@enduml").unwrap();

    let (mut session, _bridge) = session();
    let err = render_command(&mut session, &input, None).await.unwrap_err();

    assert!(format!("{:#}", err).contains("Syntax Error? (line 2)"));
    assert!(!temp_dir.path().join("broken.png").exists());
    assert_eq!(
        session.preview().status(),
        &PreviewStatus::Error("Syntax Error? (line 2)".to_string())
    );
}

#[tokio::test]
async fn test_render_rejects_prose() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("notes.puml");
    fs::write(&input, "Shopping list: milk, eggs").unwrap();

    let (mut session, bridge) = session();
    let err = render_command(&mut session, &input, None).await.unwrap_err();

    assert!(format!("{:#}", err).contains("does not look like a PlantUML diagram"));
    assert_eq!(bridge.calls(), 0);
}

#[tokio::test]
async fn test_render_missing_input() {
    let temp_dir = TempDir::new().unwrap();
    let (mut session, _bridge) = session();

    let err = render_command(&mut session, &temp_dir.path().join("absent.puml"), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Input file not found"));
}

#[tokio::test]
async fn test_render_svg_with_explicit_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("classes.puml");
    let output = temp_dir.path().join("out").join("classes.svg");
    fs::create_dir_all(output.parent().unwrap()).unwrap();
    fs::write(&input, "class Foo\nclass Bar\nFoo --> Bar").unwrap();

    let capabilities = Capabilities {
        svg_display: true,
        clipboard: false,
    };
    let (mut session, _bridge) = session_with(Settings::default(), capabilities);
    session.configure(&RenderOptions {
        format: Some(OutputFormat::Svg),
        ..Default::default()
    });

    // Measuring SVG needs the rasteriser; without it the preview rejects
    // the image, so only check the file when the feature is on
    let result = render_command(&mut session, &input, Some(&output)).await;
    if cfg!(feature = "svg-preview") {
        result.unwrap();
        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains("<svg"));
    }
}

#[tokio::test]
async fn test_svg_degrades_to_png_without_capability() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("usecase.puml");
    fs::write(&input, "actor User\nusecase Login\nUser --> Login").unwrap();

    let (mut session, _bridge) = session();
    session.configure(&RenderOptions {
        format: Some(OutputFormat::Svg),
        ..Default::default()
    });

    assert_eq!(session.preview().format(), OutputFormat::Png);
    let output = render_command(&mut session, &input, None).await.unwrap();
    assert_eq!(output, temp_dir.path().join("usecase.png"));
}

#[tokio::test]
async fn test_configure_applies_preset_and_overrides() {
    let (mut session, _bridge) = session();

    session.configure(&RenderOptions {
        preset: Some(QualityPreset::Print),
        dpi: Some(100),
        ..Default::default()
    });
    assert_eq!(session.preview().quality().dpi, Some(600));

    session.configure(&RenderOptions {
        dpi: Some(300),
        ..Default::default()
    });
    let quality = session.preview().quality();
    assert_eq!(quality.dpi, Some(300));
    assert_eq!(quality.scale, Some(1.0));
}

#[tokio::test]
async fn test_repeat_render_served_from_cache() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("flow.puml");
    fs::write(&input, "A -> B").unwrap();

    let (mut session, bridge) = session();
    render_command(&mut session, &input, None).await.unwrap();
    render_command(&mut session, &input, None).await.unwrap();

    assert_eq!(bridge.calls(), 1);
    assert_eq!(session.service().cached(), 1);
}

#[tokio::test]
async fn test_watch_renders_after_quiet_period() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("watch.puml");
    fs::write(&input, "Alice -> Bob: hi").unwrap();

    let settings = Settings::from_toml_str("[render]\ndebounce_ms = 20\n").unwrap();
    let (mut session, bridge) = session_with(settings, Capabilities::png_only());

    let shutdown = tokio::time::sleep(Duration::from_millis(600));
    let renders = watch_command(&mut session, &input, None, shutdown)
        .await
        .unwrap();

    assert_eq!(renders, 1);
    assert_eq!(bridge.calls(), 1);
    assert!(temp_dir.path().join("watch.png").exists());
}

/// Holds the render of "first" until released; answers with a PNG whose
/// width tells the two sources apart
struct HeldBridge {
    release: Mutex<Option<mpsc::Receiver<()>>>,
    first_started: AtomicBool,
}

impl RenderBridge for HeldBridge {
    fn name(&self) -> &'static str {
        "held"
    }

    fn render(
        &self,
        source: &str,
        _format: OutputFormat,
        _quality: &QualityOptions,
    ) -> plantview_render::Result<Vec<u8>> {
        if source.contains("first") {
            self.first_started.store(true, Ordering::SeqCst);
            if let Some(release) = self.release.lock().unwrap().take() {
                let _ = release.recv();
            }
            return Ok(stub_png(10, 10));
        }
        Ok(stub_png(20, 10))
    }
}

async fn wait_until(what: &str, mut ready: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !ready() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_edit_during_render_supersedes_it() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("edited.puml");
    let output = temp_dir.path().join("edited.png");
    fs::write(&input, "Alice -> Bob: first").unwrap();

    let (release, held) = mpsc::channel();
    let bridge = Arc::new(HeldBridge {
        release: Mutex::new(Some(held)),
        first_started: AtomicBool::new(false),
    });
    let settings = Settings::from_toml_str("[render]\ndebounce_ms = 20\n").unwrap();
    let mut session = Session::new(settings, bridge.clone(), Capabilities::png_only());
    let service = session.service().clone();

    let editor = {
        let input = input.clone();
        let output = output.clone();
        async move {
            wait_until("first render", || bridge.first_started.load(Ordering::SeqCst)).await;

            fs::write(&input, "Alice -> Bob: second").unwrap();
            // Make sure the edit is visible even with coarse timestamps
            fs::File::options()
                .write(true)
                .open(&input)
                .unwrap()
                .set_modified(SystemTime::now() + Duration::from_secs(5))
                .unwrap();
            wait_until("second submission", || service.latest_request() >= 2).await;

            release.send(()).unwrap();
            wait_until("output", || output.exists()).await;
        }
    };

    let renders = watch_command(&mut session, &input, None, editor)
        .await
        .unwrap();

    assert_eq!(renders, 1);
    assert_eq!(image::image_dimensions(&output).unwrap(), (20, 10));
    assert_eq!(session.preview().display_size(), Some((20, 10)));
}

#[tokio::test]
async fn test_watch_missing_input() {
    let temp_dir = TempDir::new().unwrap();
    let (mut session, _bridge) = session();

    let result = watch_command(
        &mut session,
        &temp_dir.path().join("absent.puml"),
        None,
        std::future::ready(()),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_copy_refused_without_clipboard() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("copy.puml");
    fs::write(&input, "Alice -> Bob: hi").unwrap();

    let (mut session, bridge) = session();
    let err = copy_command(&mut session, &input).await.unwrap_err();

    assert!(err.to_string().contains("No clipboard"));
    assert_eq!(bridge.calls(), 0);
}

#[test]
fn test_check_accepts_marked_source() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("marked.puml");
    fs::write(&input, "@startuml\nBob -> Alice\n@enduml\n").unwrap();

    assert!(check_command(&input, ReportFormat::Json).unwrap());
}
