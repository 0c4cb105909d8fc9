use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use std::path::PathBuf;
use video_scene_cut::{process_video, ConfigLoader, ConfigOverrides};

/// 镜头切换检测工具 - 用自适应阈值找出视频中的场景切换
#[derive(Parser, Debug)]
#[command(name = "video-scene-cut")]
#[command(about = "镜头切换检测：逐帧比较相邻画面，输出场景切换的帧序号", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 检测本地视频文件中的场景切换
    Detect {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 输出目录
        /// 可通过环境变量 VIDEO_SCD_OUTPUT_DIR 或配置文件设置
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// 配置文件路径（可选，支持 .ini 格式）
        /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
        #[arg(long)]
        config: Option<PathBuf>,

        /// 帧差异度量方法：SAD, SSD, MAD, CORR
        #[arg(short, long)]
        method: Option<String>,

        /// 滑动窗口长度（帧）
        #[arg(short, long)]
        window_size: Option<usize>,

        /// 阈值中均值的系数
        #[arg(short = 'a', long = "coef-a", allow_hyphen_values = true)]
        a: Option<f64>,

        /// 阈值中标准差的系数
        #[arg(short = 'b', long = "coef-b", allow_hyphen_values = true)]
        b: Option<f64>,

        /// 切换后的阈值衰减强度
        #[arg(short = 'c', long = "coef-c", allow_hyphen_values = true)]
        c: Option<f64>,

        /// 阈值下限
        #[arg(short = 's', long = "floor")]
        s: Option<f64>,

        /// 衰减持续帧数
        #[arg(short = 'k', long = "decay-frames")]
        k: Option<usize>,

        /// 窗口中至少有多少个分数才开始判断
        #[arg(long)]
        warmup: Option<usize>,

        /// 帧采样率（每秒采样多少帧），不设置则逐帧处理
        #[arg(long)]
        sample_rate: Option<f64>,

        /// 保存切换前后的关键帧和分数曲线
        #[arg(long)]
        display: bool,

        /// 写出结果文件（文本列表和 JSON 元数据）
        #[arg(long)]
        output: bool,
    },
    /// 生成带默认参数的配置文件
    InitConfig {
        /// 配置文件路径
        #[arg(long, default_value = "video-scene-cut.ini")]
        path: PathBuf,
    },
}

fn init_logging(config_file: Option<&std::path::Path>) {
    let level = ConfigLoader::load_log_level(config_file);
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Detect {
            input,
            output_dir,
            config: config_file,
            method,
            window_size,
            a,
            b,
            c,
            s,
            k,
            warmup,
            sample_rate,
            display,
            output,
        } => {
            init_logging(config_file.as_deref());

            // 开关参数只在命令行显式给出时覆盖下层配置
            let overrides = ConfigOverrides {
                window_size,
                method,
                a,
                b,
                c,
                s,
                k,
                warmup,
                display: display.then_some(true),
                output: output.then_some(true),
                output_dir,
                sample_rate,
            };
            let config = ConfigLoader::load_config(config_file.as_deref(), overrides)
                .context("加载配置失败")?;

            let detector = &config.detector;
            println!(
                "使用配置: method={}, window_size={}, a={}, b={}, c={}, s={}, k={}, warmup={}",
                detector.method,
                detector.window_size,
                detector.a,
                detector.b,
                detector.c,
                detector.s,
                detector.k,
                detector.warmup
            );

            let result = process_video(&input, &config).context("处理视频失败")?;

            println!("检测到 {} 个场景切换（共 {} 帧）:", result.events.len(), result.frames_processed);
            for event in &result.events {
                println!("{} {}", event.prev_frame_index, event.curr_frame_index);
            }
            for path in &result.written_files {
                println!("已写出: {}", path.display());
            }
        }
        Commands::InitConfig { path } => {
            ConfigLoader::create_default_config(&path)
                .with_context(|| format!("生成配置文件失败: {}", path.display()))?;
            println!("已生成配置文件: {}", path.display());
        }
    }

    Ok(())
}
