// 该文件是 Guanlan （观澜） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use guanlan::input::create_frame_source;
use guanlan::model::{DetectConfig, ModelSource, SessionBuilder};
use guanlan::output::{BoxSink, OutputError, create_box_sink};
use guanlan::task::FrameScheduler;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("检测模型: {}", args.model);
  info!("NMS 模型: {}", args.nms_model);
  info!("输入来源: {}", args.input);
  info!("输出方式: {}", args.output);

  let config = DetectConfig::new(args.topk, args.iou_threshold, args.score_threshold)
    .context("检测参数无效")?;

  info!("正在加载模型...");
  let session = SessionBuilder::new(
    ModelSource::FilePath(args.model.clone().into()),
    ModelSource::FilePath(args.nms_model.clone().into()),
  )
  .build()?;

  info!("正在打开输入源...");
  let mut source = create_frame_source(&args.input)?;
  info!(
    "输入源已打开: {}x{} {}",
    source.width(),
    source.height(),
    if source.is_live() { "实况" } else { "静态" }
  );

  let mut sink = build_sink(&args)?;

  let scheduler = Arc::new(FrameScheduler::new(Arc::new(session), config));

  // Ctrl-C 停止视频检测循环
  let ctrlc_scheduler = scheduler.clone();
  ctrlc::set_handler(move || ctrlc_scheduler.stop()).context("无法设置 Ctrl-C 处理")?;

  if source.is_live() {
    let max_frames = (args.max_frames > 0).then_some(args.max_frames);
    let stats = scheduler.run_video(source.as_mut(), sink.as_mut(), max_frames)?;
    info!(
      "处理完成: {} 帧, {} 次分发, 耗时 {:.2?}",
      stats.frames, stats.delivered, stats.elapsed
    );
  } else {
    let detections = scheduler.detect_image(source.as_mut(), sink.as_mut())?;
    info!("处理完成: {} 个检测结果", detections.len());
  }

  Ok(())
}

fn build_sink(args: &args::Args) -> Result<Box<dyn BoxSink<Error = OutputError>>> {
  #[cfg(feature = "save_image_file")]
  {
    use guanlan::output::{Draw, SaveImageFileOutput};
    use guanlan::{FromUrl, FromUrlWithScheme};

    if args.output.scheme() == SaveImageFileOutput::SCHEME
      && let Some(font) = &args.font
    {
      let sink = SaveImageFileOutput::from_url(&args.output)?
        .with_draw(Draw::default().with_font_file(font));
      return Ok(Box::new(sink));
    }
  }

  Ok(create_box_sink(&args.output)?)
}
