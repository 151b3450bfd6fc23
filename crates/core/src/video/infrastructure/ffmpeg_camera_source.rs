use ffmpeg_next::format::context::{Context, Input};
use ffmpeg_next::format::format::Format;
use ffmpeg_next::software::scaling;

use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;
use crate::video::domain::frame_source::{
    CameraOpener, DeviceError, FrameSource, FrameSourceError,
};

/// How to reach the camera.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Device path or name (`/dev/video0`, `0`, `video=Integrated Camera`),
    /// or any file/URL ffmpeg can open.
    pub device: String,
    /// libavdevice demuxer (`v4l2`, `avfoundation`, `dshow`). `None` lets
    /// ffmpeg probe, which is what files and URLs need.
    pub input_format: Option<String>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Opens [`FfmpegCameraSource`]s from a fixed [`CameraConfig`].
pub struct FfmpegCameraOpener {
    config: CameraConfig,
}

impl FfmpegCameraOpener {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl CameraOpener for FfmpegCameraOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, DeviceError> {
        Ok(Box::new(FfmpegCameraSource::open(&self.config)?))
    }
}

struct Decoding {
    ictx: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    flushing: bool,
}

/// Live camera (or file) decoded via ffmpeg-next into RGB24 [`Frame`]s.
pub struct FfmpegCameraSource {
    decoding: Option<Decoding>,
    metadata: StreamMetadata,
    frame_index: usize,
}

// Safety: the source is moved into the session thread and only touched
// there, or under the controller's handle-slot mutex.
unsafe impl Send for FfmpegCameraSource {}

impl FfmpegCameraSource {
    pub fn open(config: &CameraConfig) -> Result<Self, DeviceError> {
        let open_err = |reason: String| DeviceError::Open {
            device: config.device.clone(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_err(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let ictx = match &config.input_format {
            Some(name) => {
                let format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == name.as_str())
                    .ok_or_else(|| open_err(format!("input format '{name}' is not available")))?;
                let mut opts = ffmpeg_next::Dictionary::new();
                opts.set("video_size", &format!("{}x{}", config.width, config.height));
                opts.set("framerate", &config.frame_rate.to_string());
                match ffmpeg_next::format::open_with(&config.device, &Format::Input(format), opts)
                {
                    Ok(Context::Input(ictx)) => ictx,
                    Ok(Context::Output(_)) => {
                        return Err(open_err("device opened as an output".to_string()))
                    }
                    Err(e) => return Err(open_err(e.to_string())),
                }
            }
            None => ffmpeg_next::format::input(&config.device).map_err(|e| open_err(e.to_string()))?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| DeviceError::NoVideoStream(config.device.clone()))?;
        let stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| DeviceError::Decoder(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| DeviceError::Decoder(e.to_string()))?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let metadata = StreamMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            device: config.device.clone(),
        };

        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| DeviceError::Decoder(e.to_string()))?;

        log::info!(
            "Opened camera {} ({}x{} @ {:.1} fps, {})",
            metadata.device,
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec
        );

        Ok(Self {
            decoding: Some(Decoding {
                ictx,
                decoder,
                scaler,
                stream_index,
                flushing: false,
            }),
            metadata,
            frame_index: 0,
        })
    }

    fn receive(&mut self) -> Option<Result<Frame, FrameSourceError>> {
        let d = self.decoding.as_mut()?;
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if d.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = d.scaler.run(&decoded, &mut rgb) {
            return Some(Err(FrameSourceError::Read(e.to_string())));
        }
        let (w, h) = (self.metadata.width, self.metadata.height);
        let frame = Frame::new(extract_rgb_pixels(&rgb, w, h), w, h, 3, self.frame_index);
        self.frame_index += 1;
        Some(Ok(frame))
    }
}

impl FrameSource for FfmpegCameraSource {
    fn read(&mut self) -> Result<Frame, FrameSourceError> {
        if self.decoding.is_none() {
            return Err(FrameSourceError::Released);
        }

        loop {
            if let Some(result) = self.receive() {
                return result;
            }
            let Some(d) = self.decoding.as_mut() else {
                return Err(FrameSourceError::Released);
            };
            if d.flushing {
                return Err(FrameSourceError::EndOfStream);
            }

            let Some((stream, packet)) = d.ictx.packets().next() else {
                let _ = d.decoder.send_eof();
                d.flushing = true;
                continue;
            };
            if stream.index() != d.stream_index {
                continue;
            }
            if let Err(e) = d.decoder.send_packet(&packet) {
                log::debug!("Dropped undecodable packet: {e}");
            }
        }
    }

    fn release(&mut self) {
        if self.decoding.take().is_some() {
            log::info!("Released camera {}", self.metadata.device);
        }
    }

    fn metadata(&self) -> Option<&StreamMetadata> {
        Some(&self.metadata)
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed RGB buffer,
/// dropping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
