// 该文件是 Guanlan （观澜） 项目的一部分。
// src/task.rs - 检测任务调度
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

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::input::FrameSource;
use crate::model::{DetectConfig, Detection, Detector};
use crate::output::BoxSink;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING_IMAGE: u8 = 1;
const STATE_RUNNING_VIDEO: u8 = 2;
const STATE_STOPPING: u8 = 3;

/// 取消令牌
///
/// 每个调度器实例持有自己的令牌，多个独立的视频流互不干扰。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  flag: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }

  fn reset(&self) {
    self.flag.store(false, Ordering::SeqCst);
  }
}

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
  Idle,
  RunningImage,
  RunningVideo,
  Stopping,
}

impl SchedulerState {
  fn from_u8(value: u8) -> Self {
    match value {
      STATE_RUNNING_IMAGE => SchedulerState::RunningImage,
      STATE_RUNNING_VIDEO => SchedulerState::RunningVideo,
      STATE_STOPPING => SchedulerState::Stopping,
      _ => SchedulerState::Idle,
    }
  }
}

/// 视频检测循环统计
#[derive(Debug, Clone, Copy)]
pub struct VideoStats {
  /// 取到的帧数
  pub frames: u64,
  /// 分发到输出的周期数
  pub delivered: u64,
  /// 循环总耗时
  pub elapsed: Duration,
}

/// 帧调度器
///
/// 驱动两条检测路径: 静态图片的单次周期与视频的连续循环。
/// 同一调度器同一时刻最多一个检测周期在途；
/// 配置与会话在每个周期开始时取快照，修改从下一个周期生效。
pub struct FrameScheduler<D> {
  detector: Mutex<Arc<D>>,
  config: Mutex<DetectConfig>,
  state: AtomicU8,
  cancel: CancelToken,
}

impl<D: Detector> FrameScheduler<D> {
  pub fn new(detector: Arc<D>, config: DetectConfig) -> Self {
    Self {
      detector: Mutex::new(detector),
      config: Mutex::new(config),
      state: AtomicU8::new(STATE_IDLE),
      cancel: CancelToken::new(),
    }
  }

  pub fn state(&self) -> SchedulerState {
    SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
  }

  pub fn config(&self) -> DetectConfig {
    *self.config.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 更新检测参数，从下一个周期生效
  pub fn set_config(&self, config: DetectConfig) {
    *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
  }

  /// 替换检测会话，从下一个周期生效
  ///
  /// 会话整体替换，在途周期继续使用旧会话，
  /// 不会出现新旧网络句柄混用。
  pub fn replace_detector(&self, detector: Arc<D>) {
    *self
      .detector
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = detector;
  }

  /// 请求停止视频检测循环
  ///
  /// 空闲时为空操作。停止在一个调度周期内生效，
  /// 在途周期允许完成但其结果不再分发。
  pub fn stop(&self) {
    if self.state() == SchedulerState::Idle {
      debug!("调度器空闲，忽略停止请求");
      return;
    }
    info!("请求停止检测");
    self.cancel.cancel();
  }

  /// 本周期快照: 配置与会话在周期内保持不变
  fn snapshot(&self) -> (Arc<D>, DetectConfig) {
    let detector = self
      .detector
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    let config = *self.config.lock().unwrap_or_else(PoisonError::into_inner);
    (detector, config)
  }

  fn transition(&self, from: u8, to: u8) -> anyhow::Result<()> {
    self
      .state
      .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
      .map_err(|actual| {
        anyhow::anyhow!("调度器忙: 当前状态 {:?}", SchedulerState::from_u8(actual))
      })?;
    Ok(())
  }

  fn finish(&self) {
    self.cancel.reset();
    self.state.store(STATE_IDLE, Ordering::SeqCst);
  }

  /// 静态图片路径: 恰好运行一个检测周期
  ///
  /// 周期内的任何失败直接上报调用方。
  pub fn detect_image<S, K>(&self, source: &mut S, sink: &mut K) -> anyhow::Result<Vec<Detection>>
  where
    S: FrameSource + ?Sized,
    K: BoxSink + ?Sized,
    K::Error: std::error::Error + Send + Sync + 'static,
  {
    self.transition(STATE_IDLE, STATE_RUNNING_IMAGE)?;
    let result = self.image_cycle(source, sink);
    self.finish();
    result
  }

  fn image_cycle<S, K>(&self, source: &mut S, sink: &mut K) -> anyhow::Result<Vec<Detection>>
  where
    S: FrameSource + ?Sized,
    K: BoxSink + ?Sized,
    K::Error: std::error::Error + Send + Sync + 'static,
  {
    let frame = source
      .grab()
      .context("获取输入帧失败")?
      .ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;

    let (detector, config) = self.snapshot();
    let now = Instant::now();
    let detections = detector
      .detect(&frame, &config)
      .context("检测周期失败")?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    sink
      .render(&frame, &detections)
      .context("分发检测结果失败")?;

    Ok(detections)
  }

  /// 视频路径: 连续的自定速检测循环
  ///
  /// 拉取式帧源为循环定速: 每次迭代取当前帧，推理期间
  /// 到达的帧被跳过，不产生积压队列。单个坏帧或失败周期
  /// 只丢弃该帧，循环继续。
  pub fn run_video<S, K>(
    &self,
    source: &mut S,
    sink: &mut K,
    max_frames: Option<u64>,
  ) -> anyhow::Result<VideoStats>
  where
    S: FrameSource + ?Sized,
    K: BoxSink + ?Sized,
    K::Error: std::error::Error + Send + Sync + 'static,
  {
    self.transition(STATE_IDLE, STATE_RUNNING_VIDEO)?;
    let result = self.video_loop(source, sink, max_frames);
    self.finish();
    result
  }

  fn video_loop<S, K>(
    &self,
    source: &mut S,
    sink: &mut K,
    max_frames: Option<u64>,
  ) -> anyhow::Result<VideoStats>
  where
    S: FrameSource + ?Sized,
    K: BoxSink + ?Sized,
    K::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("视频检测循环开始");
    let started = Instant::now();
    let mut frames = 0u64;
    let mut delivered = 0u64;

    loop {
      if self.cancel.is_cancelled() {
        info!("收到停止请求，退出检测循环");
        self.state.store(STATE_STOPPING, Ordering::SeqCst);
        break;
      }

      if let Some(max) = max_frames
        && frames >= max
      {
        info!("达到指定帧数 {}, 退出检测循环", max);
        break;
      }

      let frame = match source.grab() {
        Ok(Some(frame)) => frame,
        Ok(None) => {
          info!("输入流结束");
          break;
        }
        Err(e) => {
          warn!("获取帧失败，跳过该帧: {}", e);
          continue;
        }
      };
      frames += 1;

      let (detector, config) = self.snapshot();
      let detections = match detector.detect(&frame, &config) {
        Ok(detections) => detections,
        Err(e) => {
          error!("检测周期失败，丢弃该帧: {}", e);
          continue;
        }
      };

      // 停止请求先于分发生效: 在途结果不再交给输出
      if self.cancel.is_cancelled() {
        debug!("停止请求先于结果分发，丢弃在途结果");
        self.state.store(STATE_STOPPING, Ordering::SeqCst);
        break;
      }

      sink
        .render(&frame, &detections)
        .context("分发检测结果失败")?;
      delivered += 1;

      debug!("第 {} 帧处理完成, {} 个结果", frames, detections.len());
    }

    let stats = VideoStats {
      frames,
      delivered,
      elapsed: started.elapsed(),
    };
    info!(
      "视频检测循环结束: {} 帧, {} 次分发, 耗时 {:.2?}",
      stats.frames, stats.delivered, stats.elapsed
    );

    Ok(stats)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;
  use std::sync::mpsc::{Receiver, Sender, channel};
  use std::thread;

  use image::RgbaImage;

  use crate::frame::{Frame, FrameOrigin};
  use crate::input::MemorySource;

  fn still_frame() -> Frame {
    Frame::from_image(RgbaImage::new(8, 8), FrameOrigin::Still).unwrap()
  }

  fn frames(n: usize) -> Vec<Frame> {
    (0..n).map(|_| still_frame()).collect()
  }

  fn sample_detection() -> Detection {
    Detection {
      label: 0,
      probability: 0.9,
      bounding: [1.0, 2.0, 3.0, 4.0],
    }
  }

  #[derive(Debug, thiserror::Error)]
  #[error("检测失败（测试）")]
  struct MockError;

  /// 可插桩的检测器: 记录每次调用的配置，检查周期是否重叠，
  /// 可选地在指定一次调用上失败，或在门上阻塞等待放行。
  struct MockDetector {
    detections: Vec<Detection>,
    calls: AtomicUsize,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    configs: Mutex<Vec<DetectConfig>>,
    fail_on_call: Option<usize>,
    started: Option<Sender<()>>,
    gate: Option<Mutex<Receiver<()>>>,
  }

  impl MockDetector {
    fn new(detections: Vec<Detection>) -> Self {
      Self {
        detections,
        calls: AtomicUsize::new(0),
        in_flight: AtomicBool::new(false),
        overlapped: AtomicBool::new(false),
        configs: Mutex::new(Vec::new()),
        fail_on_call: None,
        started: None,
        gate: None,
      }
    }

    fn failing_on(mut self, call: usize) -> Self {
      self.fail_on_call = Some(call);
      self
    }

    /// 每次调用先上报开始，再阻塞等待放行
    fn gated(mut self) -> (Self, Receiver<()>, Sender<()>) {
      let (started_tx, started_rx) = channel();
      let (release_tx, release_rx) = channel();
      self.started = Some(started_tx);
      self.gate = Some(Mutex::new(release_rx));
      (self, started_rx, release_tx)
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    fn recorded_configs(&self) -> Vec<DetectConfig> {
      self.configs.lock().unwrap().clone()
    }

    fn overlapped(&self) -> bool {
      self.overlapped.load(Ordering::SeqCst)
    }
  }

  impl Detector for MockDetector {
    type Error = MockError;

    fn detect(
      &self,
      _frame: &Frame,
      config: &DetectConfig,
    ) -> Result<Vec<Detection>, MockError> {
      if self.in_flight.swap(true, Ordering::SeqCst) {
        self.overlapped.store(true, Ordering::SeqCst);
      }

      let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      self.configs.lock().unwrap().push(*config);

      if let Some(started) = &self.started {
        let _ = started.send(());
      }
      if let Some(gate) = &self.gate {
        // 放行端被关闭时直接继续，避免测试收尾时卡死
        let _ = gate.lock().unwrap().recv();
      }

      thread::sleep(Duration::from_millis(1));
      self.in_flight.store(false, Ordering::SeqCst);

      if self.fail_on_call == Some(call) {
        return Err(MockError);
      }
      Ok(self.detections.clone())
    }
  }

  /// 收集每次分发的输出
  #[derive(Clone, Default)]
  struct CollectSink {
    calls: Arc<Mutex<Vec<Vec<Detection>>>>,
  }

  impl CollectSink {
    fn count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }

    fn last(&self) -> Option<Vec<Detection>> {
      self.calls.lock().unwrap().last().cloned()
    }
  }

  impl BoxSink for CollectSink {
    type Error = std::convert::Infallible;

    fn render(&mut self, _frame: &Frame, detections: &[Detection]) -> Result<(), Self::Error> {
      self.calls.lock().unwrap().push(detections.to_vec());
      Ok(())
    }
  }

  fn wait_for_state<D: Detector>(scheduler: &FrameScheduler<D>, state: SchedulerState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while scheduler.state() != state {
      assert!(Instant::now() < deadline, "等待状态 {:?} 超时", state);
      thread::yield_now();
    }
  }

  #[test]
  fn cancel_tokens_are_independent() {
    let a = CancelToken::new();
    let b = CancelToken::new();
    a.cancel();
    assert!(a.is_cancelled());
    assert!(!b.is_cancelled());

    let c = a.clone();
    assert!(c.is_cancelled());
  }

  #[test]
  fn image_cycle_delivers_even_when_empty() {
    let detector = Arc::new(MockDetector::new(Vec::new()));
    let scheduler = FrameScheduler::new(detector.clone(), DetectConfig::default());
    let mut source = MemorySource::new(frames(1));
    let mut sink = CollectSink::default();

    let detections = scheduler.detect_image(&mut source, &mut sink).unwrap();

    assert!(detections.is_empty());
    assert_eq!(sink.count(), 1);
    assert_eq!(sink.last().unwrap(), Vec::new());
    assert_eq!(scheduler.state(), SchedulerState::Idle);
  }

  #[test]
  fn image_cycle_without_frame_fails() {
    let detector = Arc::new(MockDetector::new(Vec::new()));
    let scheduler = FrameScheduler::new(detector, DetectConfig::default());
    let mut source = MemorySource::new(Vec::new());
    let mut sink = CollectSink::default();

    assert!(scheduler.detect_image(&mut source, &mut sink).is_err());
    assert_eq!(sink.count(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
  }

  #[test]
  fn image_cycle_surfaces_detector_failure() {
    let detector = Arc::new(MockDetector::new(Vec::new()).failing_on(1));
    let scheduler = FrameScheduler::new(detector, DetectConfig::default());
    let mut source = MemorySource::new(frames(1));
    let mut sink = CollectSink::default();

    assert!(scheduler.detect_image(&mut source, &mut sink).is_err());
    assert_eq!(sink.count(), 0);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
  }

  #[test]
  fn video_loop_processes_stream_to_end() {
    let detector = Arc::new(MockDetector::new(vec![sample_detection()]));
    let scheduler = FrameScheduler::new(detector.clone(), DetectConfig::default());
    let mut source = MemorySource::new(frames(5));
    let mut sink = CollectSink::default();

    let stats = scheduler.run_video(&mut source, &mut sink, None).unwrap();

    assert_eq!(stats.frames, 5);
    assert_eq!(stats.delivered, 5);
    assert_eq!(sink.count(), 5);
    assert_eq!(detector.calls(), 5);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
  }

  #[test]
  fn video_loop_respects_max_frames() {
    let detector = Arc::new(MockDetector::new(Vec::new()));
    let scheduler = FrameScheduler::new(detector, DetectConfig::default());
    let mut source = MemorySource::cycling(frames(1));
    let mut sink = CollectSink::default();

    let stats = scheduler.run_video(&mut source, &mut sink, Some(3)).unwrap();

    assert_eq!(stats.frames, 3);
    assert_eq!(stats.delivered, 3);
  }

  #[test]
  fn video_loop_survives_failed_cycle() {
    let detector = Arc::new(MockDetector::new(vec![sample_detection()]).failing_on(2));
    let scheduler = FrameScheduler::new(detector.clone(), DetectConfig::default());
    let mut source = MemorySource::new(frames(4));
    let mut sink = CollectSink::default();

    let stats = scheduler.run_video(&mut source, &mut sink, None).unwrap();

    // 第 2 个周期失败被丢弃，循环继续处理剩余帧
    assert_eq!(stats.frames, 4);
    assert_eq!(stats.delivered, 3);
    assert_eq!(detector.calls(), 4);
  }

  #[test]
  fn stop_right_after_start_bounds_deliveries() {
    let (mock, started, release) = MockDetector::new(vec![sample_detection()]).gated();
    let detector = Arc::new(mock);
    let scheduler = Arc::new(FrameScheduler::new(detector.clone(), DetectConfig::default()));
    let sink = CollectSink::default();

    let thread_scheduler = scheduler.clone();
    let mut thread_sink = sink.clone();
    let handle = thread::spawn(move || {
      let mut source = MemorySource::cycling(frames(1));
      thread_scheduler.run_video(&mut source, &mut thread_sink, None)
    });

    // 第一个周期在途时请求停止
    started.recv().unwrap();
    wait_for_state(&scheduler, SchedulerState::RunningVideo);
    scheduler.stop();
    drop(release);

    let stats = handle.join().unwrap().unwrap();

    // 在途周期允许完成，但结果在分发前被丢弃
    assert_eq!(stats.delivered, 0);
    assert!(sink.count() <= 1);
    assert_eq!(detector.calls(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    // 停止后不再有新的调度
    let count = sink.count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.count(), count);
    assert_eq!(detector.calls(), 1);
  }

  #[test]
  fn config_change_applies_to_next_cycle_only() {
    let (mock, started, release) = MockDetector::new(Vec::new()).gated();
    let detector = Arc::new(mock);
    let old_config = DetectConfig::default();
    let new_config = DetectConfig::new(10, 0.5, 0.5).unwrap();
    let scheduler = Arc::new(FrameScheduler::new(detector.clone(), old_config));

    let thread_scheduler = scheduler.clone();
    let handle = thread::spawn(move || {
      let mut source = MemorySource::cycling(frames(1));
      let mut sink = CollectSink::default();
      thread_scheduler.run_video(&mut source, &mut sink, None)
    });

    // 第 1 个周期在途时修改配置: 不影响该周期
    started.recv().unwrap();
    scheduler.set_config(new_config);
    release.send(()).unwrap();

    // 第 2 个周期使用新配置
    started.recv().unwrap();
    scheduler.stop();
    drop(release);

    let stats = handle.join().unwrap().unwrap();
    let configs = detector.recorded_configs();

    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0], old_config);
    assert_eq!(configs[1], new_config);
    assert_eq!(stats.delivered, 1);
  }

  #[test]
  fn detector_swap_applies_to_next_cycle() {
    let (first, first_started, first_release) =
      MockDetector::new(vec![sample_detection()]).gated();
    let (second, second_started, second_release) = MockDetector::new(Vec::new()).gated();
    let first = Arc::new(first);
    let second = Arc::new(second);
    let scheduler = Arc::new(FrameScheduler::new(first.clone(), DetectConfig::default()));

    let thread_scheduler = scheduler.clone();
    let handle = thread::spawn(move || {
      let mut source = MemorySource::cycling(frames(1));
      let mut sink = CollectSink::default();
      thread_scheduler.run_video(&mut source, &mut sink, None)
    });

    // 第 1 个周期在途时替换会话: 该周期仍使用旧会话
    first_started.recv().unwrap();
    scheduler.replace_detector(second.clone());
    drop(first_release);

    // 下一个周期使用新会话
    second_started.recv().unwrap();
    scheduler.stop();
    drop(second_release);

    handle.join().unwrap().unwrap();

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
  }

  #[test]
  fn cycles_never_overlap() {
    let detector = Arc::new(MockDetector::new(vec![sample_detection()]));
    let scheduler = FrameScheduler::new(detector.clone(), DetectConfig::default());
    let mut source = MemorySource::new(frames(10));
    let mut sink = CollectSink::default();

    scheduler.run_video(&mut source, &mut sink, None).unwrap();

    assert!(!detector.overlapped());
  }

  #[test]
  fn stop_when_idle_is_noop() {
    let detector = Arc::new(MockDetector::new(Vec::new()));
    let scheduler = FrameScheduler::new(detector, DetectConfig::default());

    scheduler.stop();
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    // 之前的空闲停止不影响后续运行
    let mut source = MemorySource::new(frames(3));
    let mut sink = CollectSink::default();
    let stats = scheduler.run_video(&mut source, &mut sink, None).unwrap();
    assert_eq!(stats.delivered, 3);
  }

  #[test]
  fn busy_scheduler_rejects_second_run() {
    let (mock, started, release) = MockDetector::new(Vec::new()).gated();
    let detector = Arc::new(mock);
    let scheduler = Arc::new(FrameScheduler::new(detector, DetectConfig::default()));

    let thread_scheduler = scheduler.clone();
    let handle = thread::spawn(move || {
      let mut source = MemorySource::cycling(frames(1));
      let mut sink = CollectSink::default();
      thread_scheduler.run_video(&mut source, &mut sink, None)
    });

    started.recv().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::RunningVideo);

    // 运行中的调度器拒绝并发任务
    let mut source = MemorySource::new(frames(1));
    let mut sink = CollectSink::default();
    assert!(scheduler.detect_image(&mut source, &mut sink).is_err());

    scheduler.stop();
    drop(release);
    handle.join().unwrap().unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Idle);
  }
}
