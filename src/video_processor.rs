use ffmpeg_next as ffmpeg;
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DetectError, Result};

/// 视频处理器，负责打开视频并提供逐帧解码的帧源
pub struct VideoProcessor {
    input_path: PathBuf,
}

impl VideoProcessor {
    pub fn new(input_path: impl AsRef<Path>) -> Result<Self> {
        let input_path = input_path.as_ref().to_path_buf();
        if !input_path.is_file() {
            return Err(DetectError::InvalidInputPath {
                path: input_path,
                reason: "文件不存在".to_string(),
            });
        }

        ffmpeg::init().map_err(|e| DetectError::Decode(format!("初始化 FFmpeg 失败: {}", e)))?;

        // 设置 FFmpeg 日志级别为 ERROR，抑制警告和信息消息
        unsafe {
            ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
        }

        Ok(Self { input_path })
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    fn open_input(&self) -> Result<ffmpeg::format::context::Input> {
        ffmpeg::format::input(&self.input_path).map_err(|e| DetectError::InvalidInputPath {
            path: self.input_path.clone(),
            reason: e.to_string(),
        })
    }

    fn open_decoder(
        &self,
        ictx: &ffmpeg::format::context::Input,
    ) -> Result<(usize, ffmpeg::Rational, f64, ffmpeg::decoder::Video)> {
        let video_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| DetectError::InvalidInputPath {
                path: self.input_path.clone(),
                reason: "未找到视频流".to_string(),
            })?;

        let decoder_context =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .map_err(|e| DetectError::Decode(format!("无法创建解码器上下文: {}", e)))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|e| DetectError::Decode(format!("无法创建视频解码器: {}", e)))?;

        let fps = video_stream.avg_frame_rate();
        let fps_value = if fps.denominator() > 0 && fps.numerator() > 0 {
            fps.numerator() as f64 / fps.denominator() as f64
        } else {
            30.0 // 默认值
        };

        Ok((video_stream.index(), video_stream.time_base(), fps_value, decoder))
    }

    /// 获取视频信息 (帧率, 宽, 高)
    pub fn get_video_info(&self) -> Result<(f64, u32, u32)> {
        let ictx = self.open_input()?;
        let (_, _, fps, decoder) = self.open_decoder(&ictx)?;
        Ok((fps, decoder.width(), decoder.height()))
    }

    /// 打开逐帧解码的帧源
    ///
    /// `sample_rate` 为每秒保留的帧数，`None` 表示保留所有帧。
    pub fn frames(&self, sample_rate: Option<f64>) -> Result<FrameReader> {
        let ictx = self.open_input()?;
        let (stream_index, time_base, fps, decoder) = self.open_decoder(&ictx)?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| DetectError::Decode(format!("无法创建缩放器: {}", e)))?;

        let sample_interval = match sample_rate {
            Some(rate) if rate > 0.0 && rate.is_finite() => Some(1.0 / rate),
            Some(rate) => {
                return Err(DetectError::InvalidConfiguration(format!(
                    "sample_rate 必须大于 0，实际为 {}",
                    rate
                )))
            }
            None => None,
        };

        debug!(
            "🎞️  [帧源] 打开视频流 #{}，{}x{} @ {:.2} fps，采样间隔: {:?}",
            stream_index,
            decoder.width(),
            decoder.height(),
            fps,
            sample_interval
        );

        Ok(FrameReader {
            input: ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            fps,
            sample_interval,
            next_sample_time: 0.0,
            decoded_count: 0,
            skipped_packets: 0,
            eof_sent: false,
            finished: false,
            timestamps: Vec::new(),
        })
    }
}

/// 惰性帧源：每次 `next()` 解码出一帧，不可重来
pub struct FrameReader {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    fps: f64,
    sample_interval: Option<f64>,
    next_sample_time: f64,
    decoded_count: usize,
    skipped_packets: usize,
    eof_sent: bool,
    finished: bool,
    timestamps: Vec<f64>,
}

impl FrameReader {
    /// 已输出帧的时间戳（秒），与帧序号一一对应
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn skipped_packets(&self) -> usize {
        self.skipped_packets
    }

    fn frame_time(&self, decoded: &ffmpeg::frame::Video) -> f64 {
        decoded
            .timestamp()
            .map(|ts| {
                let tb_num = self.time_base.numerator() as f64;
                let tb_den = self.time_base.denominator().max(1) as f64;
                ts as f64 * tb_num / tb_den
            })
            .unwrap_or(self.decoded_count as f64 / self.fps)
    }

    /// 按采样率决定是否保留这一帧
    fn should_keep(&mut self, frame_time: f64) -> bool {
        let Some(interval) = self.sample_interval else {
            return true;
        };
        if frame_time + 1e-9 < self.next_sample_time {
            return false;
        }
        self.next_sample_time = ((frame_time / interval).floor() + 1.0) * interval;
        true
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<DynamicImage> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| DetectError::Decode(format!("像素格式转换失败: {}", e)))?;
        frame_to_image(&rgb_frame)
    }
}

impl Iterator for FrameReader {
    type Item = Result<DynamicImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let mut decoded = ffmpeg::frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let frame_time = self.frame_time(&decoded);
                self.decoded_count += 1;
                if !self.should_keep(frame_time) {
                    continue;
                }

                return match self.convert(&decoded) {
                    Ok(image) => {
                        self.timestamps.push(frame_time);
                        Some(Ok(image))
                    }
                    Err(e) => {
                        self.finished = true;
                        Some(Err(e))
                    }
                };
            }

            // 解码器已经冲刷完毕
            if self.eof_sent {
                self.finished = true;
                if self.skipped_packets > 0 {
                    warn!("⚠️  [帧源] 解码过程中跳过了 {} 个损坏的数据包", self.skipped_packets);
                }
                return None;
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if self.decoder.send_packet(&packet).is_err() {
                        // 发送数据包失败，跳过这个数据包
                        self.skipped_packets += 1;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    // 冲刷解码器中剩余的帧
                    let _ = self.decoder.send_eof();
                    self.eof_sent = true;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(DetectError::Decode(format!("读取数据包失败: {}", e))));
                }
            }
        }
    }
}

/// 将 RGB24 格式的 FFmpeg 帧转换为 DynamicImage
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<DynamicImage> {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_bytes = width as usize * 3;

    let mut buffer = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let row = data
            .get(start..start + row_bytes)
            .ok_or_else(|| DetectError::Decode(format!("帧数据不完整: 第 {} 行越界", y)))?;
        buffer.extend_from_slice(row);
    }

    RgbImage::from_raw(width, height, buffer)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| DetectError::Decode("帧缓冲区大小与分辨率不匹配".to_string()))
}
