use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use texture_reader::config::ReaderConfig;
use texture_reader::decode::PixelLayout;
use texture_reader::error::ReadError;
use texture_reader::events::{ReadRequest, TargetUsage, TransformParams};
use texture_reader::gpu::TextureCreator;
use texture_reader::reader::{ImageReader, PipelineState};
use texture_reader::source::{FsImageSource, ImageSource, SourceBytes};
use texture_reader::transform::FinalImage;

#[derive(Debug)]
struct FakeTexture {
    width: u32,
    height: u32,
    layout: PixelLayout,
}

/// Stand-in for the GPU: records dimensions instead of uploading.
#[derive(Default)]
struct FakeCreator;

impl TextureCreator for FakeCreator {
    type Handle = FakeTexture;

    fn create_texture(
        &mut self,
        _source_id: &str,
        image: &FinalImage,
    ) -> Result<FakeTexture, ReadError> {
        Ok(FakeTexture {
            width: image.width,
            height: image.height,
            layout: image.layout,
        })
    }
}

/// Creator that refuses every upload, as a lost device would.
struct FailingCreator;

impl TextureCreator for FailingCreator {
    type Handle = FakeTexture;

    fn create_texture(
        &mut self,
        source_id: &str,
        _image: &FinalImage,
    ) -> Result<FakeTexture, ReadError> {
        Err(ReadError::TextureCreation {
            source_id: source_id.to_string(),
            reason: "device lost".to_string(),
        })
    }
}

/// Serves the same bytes for every source id; decouples pipeline tests from
/// the filesystem.
struct StaticSource(Vec<u8>);

impl ImageSource for StaticSource {
    fn read(&self, _source_id: &str) -> Result<SourceBytes, ReadError> {
        Ok(SourceBytes {
            bytes: self.0.clone(),
            modified_at: None,
        })
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
        width,
        height,
        Rgba([200u8, 100, 50, 255]),
    ));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn scaled(percent: u32) -> TransformParams {
    TransformParams {
        usage: TargetUsage::Ui,
        percent_size_x: percent,
        percent_size_y: percent,
    }
}

#[test]
fn results_arrive_in_submission_order_after_flush() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    DynamicImage::ImageRgba8(ImageBuffer::from_pixel(8, 8, Rgba([1u8, 2, 3, 255])))
        .save(&a)
        .unwrap();
    let b = dir.path().join("b.tga");
    DynamicImage::ImageRgba8(ImageBuffer::from_pixel(4, 4, Rgba([4u8, 5, 6, 255])))
        .save(&b)
        .unwrap();

    let cfg = ReaderConfig::default();
    let source = Arc::new(FsImageSource::new(cfg.max_file_size_bytes));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    reader.submit(ReadRequest::new(a.to_string_lossy().into_owned()));
    reader.submit(ReadRequest::with_transform(
        b.to_string_lossy().into_owned(),
        scaled(50),
    ));

    reader.flush();

    let first = reader.poll().expect("first result");
    assert!(first.source_id.ends_with("a.png"));
    let texture = first.texture.expect("png should produce a texture");
    assert_eq!((texture.width, texture.height), (8, 8));
    assert_eq!(texture.layout, PixelLayout::Bgra8);

    let second = reader.poll().expect("second result");
    assert!(second.source_id.ends_with("b.tga"));
    let texture = second.texture.expect("tga should produce a texture");
    assert_eq!((texture.width, texture.height), (2, 2));

    assert!(reader.poll().is_none());
    assert!(reader.is_idle());
}

#[test]
fn corrupt_source_fails_without_stalling_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.png");
    std::fs::write(&bad, b"this is certainly not an image payload").unwrap();
    let good = dir.path().join("good.png");
    DynamicImage::ImageRgba8(ImageBuffer::from_pixel(2, 2, Rgba([9u8, 9, 9, 255])))
        .save(&good)
        .unwrap();

    let cfg = ReaderConfig::default();
    let source = Arc::new(FsImageSource::new(cfg.max_file_size_bytes));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    reader.submit(ReadRequest::new(bad.to_string_lossy().into_owned()));
    reader.submit(ReadRequest::new(good.to_string_lossy().into_owned()));
    reader.flush();

    let first = reader.poll().expect("failure result");
    assert!(first.texture.is_none());
    let error = first.error.expect("corrupt bytes must carry an error");
    assert!(!error.is_empty());

    let second = reader.poll().expect("success result");
    assert!(second.error.is_none());
    assert!(second.texture.is_some());
    assert!(reader.poll().is_none());
}

#[test]
fn oversized_resolution_is_reported_per_request() {
    let dir = tempfile::tempdir().unwrap();
    let wide = dir.path().join("wide.png");
    DynamicImage::ImageLuma8(ImageBuffer::from_pixel(16_000, 1, image::Luma([0u8])))
        .save(&wide)
        .unwrap();

    let cfg = ReaderConfig::default();
    let source = Arc::new(FsImageSource::new(cfg.max_file_size_bytes));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    reader.submit(ReadRequest::new(wide.to_string_lossy().into_owned()));
    reader.flush();

    let result = reader.poll().expect("result");
    assert!(result.texture.is_none());
    let error = result.error.unwrap();
    assert!(error.contains("resolution is not supported"));
    assert!(error.contains("16000"));
}

#[test]
fn at_most_one_construct_task_is_in_flight() {
    let cfg = ReaderConfig::default();
    let source = Arc::new(StaticSource(png_bytes(4, 4)));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    reader.submit(ReadRequest::new("a"));
    reader.submit(ReadRequest::new("b"));
    reader.submit(ReadRequest::new("c"));

    // Give the worker time to decode; without a drain it must stay parked on
    // the acknowledgment with exactly one task published.
    thread::sleep(Duration::from_millis(300));
    assert!(!reader.is_idle());
    assert!(reader.poll().is_none());

    reader.drain();
    let first = reader.poll().expect("one result per drain pass");
    assert_eq!(first.source_id, "a");
    assert!(reader.poll().is_none());

    thread::sleep(Duration::from_millis(300));
    reader.drain();
    let second = reader.poll().expect("next result");
    assert_eq!(second.source_id, "b");
    assert!(reader.poll().is_none());

    reader.flush();
    let third = reader.poll().expect("final result");
    assert_eq!(third.source_id, "c");
    assert!(reader.poll().is_none());
    assert!(reader.is_idle());
}

#[test]
fn concurrent_submitters_lose_nothing_and_keep_per_thread_order() {
    let cfg = ReaderConfig::default();
    let source = Arc::new(StaticSource(png_bytes(2, 2)));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    let threads = 4;
    let per_thread = 20;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let submitter = reader.submitter();
            thread::spawn(move || {
                for i in 0..per_thread {
                    submitter.submit(ReadRequest::new(format!("t{t}-{i:02}")));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    reader.flush();

    let mut ids = Vec::new();
    while let Some(result) = reader.poll() {
        assert!(result.is_success(), "unexpected failure for {}", result.source_id);
        ids.push(result.source_id);
    }
    assert_eq!(ids.len(), threads * per_thread);

    for t in 0..threads {
        let prefix = format!("t{t}-");
        let of_thread: Vec<_> = ids.iter().filter(|id| id.starts_with(&prefix)).collect();
        assert_eq!(of_thread.len(), per_thread);
        let mut sorted = of_thread.clone();
        sorted.sort();
        assert_eq!(of_thread, sorted, "thread {t} results out of order");
    }
}

#[test]
fn shutdown_discards_queued_work_and_is_idempotent() {
    let cfg = ReaderConfig::default();
    let source = Arc::new(StaticSource(png_bytes(128, 128)));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    for i in 0..30 {
        reader.submit(ReadRequest::new(format!("img-{i:02}")));
    }
    reader.shutdown();

    assert_eq!(reader.state(), PipelineState::Stopped);
    assert!(reader.is_idle());

    // flush after shutdown must not block
    reader.flush();
    reader.shutdown();
    assert_eq!(reader.state(), PipelineState::Stopped);
}

#[test]
fn submit_after_shutdown_is_ignored() {
    let cfg = ReaderConfig::default();
    let source = Arc::new(StaticSource(png_bytes(2, 2)));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    reader.shutdown();
    reader.submit(ReadRequest::new("late"));
    let submitter = reader.submitter();
    submitter.submit(ReadRequest::new("later-still"));

    assert!(reader.is_idle());
    reader.flush();
    assert!(reader.poll().is_none());
}

#[test]
fn creation_failure_is_per_request_and_non_fatal() {
    let cfg = ReaderConfig::default();
    let source = Arc::new(StaticSource(png_bytes(2, 2)));
    let mut reader = ImageReader::initialize(&cfg, source, FailingCreator).unwrap();

    reader.submit(ReadRequest::new("first"));
    reader.submit(ReadRequest::new("second"));
    reader.flush();

    for expected in ["first", "second"] {
        let result = reader.poll().expect("result despite creation failure");
        assert_eq!(result.source_id, expected);
        assert!(result.texture.is_none());
        assert!(result.error.unwrap().contains("texture creation failed"));
    }
    assert!(reader.is_idle());
}

#[test]
fn invalid_transform_params_are_rejected_before_decode() {
    let cfg = ReaderConfig::default();
    // Bytes that would fail decode; the parameter check must fire first.
    let source = Arc::new(StaticSource(b"not an image".to_vec()));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    reader.submit(ReadRequest::with_transform(
        "skewed",
        TransformParams {
            usage: TargetUsage::Ui,
            percent_size_x: 100,
            percent_size_y: 40,
        },
    ));
    reader.flush();

    let result = reader.poll().expect("result");
    assert!(result.texture.is_none());
    assert!(result.error.unwrap().contains("invalid transform parameters"));
}

#[test]
fn clear_discards_unclaimed_results() {
    let cfg = ReaderConfig::default();
    let source = Arc::new(StaticSource(png_bytes(2, 2)));
    let mut reader = ImageReader::initialize(&cfg, source, FakeCreator).unwrap();

    reader.submit(ReadRequest::new("kept-in-store"));
    reader.flush();

    reader.clear();
    assert!(reader.poll().is_none());
    assert!(reader.is_idle());
}
