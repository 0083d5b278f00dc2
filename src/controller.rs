//! The frame loop: hands in, audio actions out.

use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::{
    audio::{AudioAction, AudioBackend, create_backend, dispatch},
    config::ControlConfig,
    fps::FpsCalc,
    gesture::{
        classifier::{Classifier, KEYPOINT_INPUT_LEN, OrtClassifier},
        distance::DistanceVolume,
        labels::LabelSet,
        preprocess::{calc_landmark_list, pre_process_landmark},
        smoother::TemporalSmoother,
        state_machine::{GestureStateMachine, VolumeLevel},
    },
    pipeline::{FrameSource, HandDetector, ImageSequenceSource, OrtHandDetector},
    shutdown::ExitSignal,
    status::StatusLine,
    types::{DetectedHand, FingerGesture, HandState, INDEX_FINGER_TIP, PixelPoint},
};

const POINTER_LABEL: &str = "Pointer";
/// Class id of the pointing sign in the stock keypoint label file.
const DEFAULT_POINTER_ID: usize = 2;
const FPS_BUFFER_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{model} returned class {id} but only {len} labels are known")]
    UnknownLabel {
        model: &'static str,
        id: usize,
        len: usize,
    },
    #[error("landmark vector has {actual} values, expected {expected}")]
    LandmarkLength { expected: usize, actual: usize },
}

/// Both classifiers with the label files naming their outputs.
pub struct GestureModels {
    pub keypoint: Box<dyn Classifier>,
    pub keypoint_labels: LabelSet,
    pub point_history: Box<dyn Classifier>,
    pub point_history_labels: LabelSet,
}

impl GestureModels {
    pub fn load(config: &ControlConfig) -> Result<Self> {
        let keypoint_labels = LabelSet::load(&config.keypoint_labels_path())?;
        let point_history_labels = LabelSet::load(&config.point_history_labels_path())?;
        let keypoint = OrtClassifier::keypoint(&config.keypoint_model_path())?;
        let point_history =
            OrtClassifier::point_history(&config.point_history_model_path(), config.history_length)?;

        Ok(Self {
            keypoint: Box::new(keypoint),
            keypoint_labels,
            point_history: Box::new(point_history),
            point_history_labels,
        })
    }
}

/// What one frame produced, for the status line.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub hand_label: Option<String>,
    pub finger_label: Option<String>,
    pub actions: Vec<AudioAction>,
}

pub struct GestureControl<A: AudioBackend> {
    models: GestureModels,
    pointer_id: usize,
    smoother: TemporalSmoother,
    state_machine: GestureStateMachine,
    distance: DistanceVolume,
    volume: VolumeLevel,
    audio: A,
}

impl<A: AudioBackend> GestureControl<A> {
    pub fn new(config: &ControlConfig, models: GestureModels, mut audio: A) -> Self {
        let pointer_id = models
            .keypoint_labels
            .position(POINTER_LABEL)
            .unwrap_or(DEFAULT_POINTER_ID);

        let volume = match audio.current_volume() {
            Ok(Some(percentage)) => VolumeLevel::new(percentage),
            Ok(None) => VolumeLevel::default(),
            Err(err) => {
                log::warn!("could not read current volume from {}: {err:?}", audio.name());
                VolumeLevel::default()
            }
        };
        log::info!("starting at {}% volume", volume.percentage());

        Self {
            models,
            pointer_id,
            smoother: TemporalSmoother::new(config.history_length),
            state_machine: GestureStateMachine::new(),
            distance: DistanceVolume::new(config.delay, config.threshold),
            volume,
            audio,
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume.percentage()
    }

    /// Advance every piece of gesture state by one frame and fire the resulting actions.
    pub fn handle_hands(
        &mut self,
        hands: &[DetectedHand],
        frame_size: (u32, u32),
        now: Instant,
    ) -> Result<FrameOutcome> {
        if let [hand] = hands {
            self.distance.reset();
            return self.handle_single_hand(hand, frame_size);
        }

        // Keep the fingertip trajectory aligned in time.
        self.smoother.observe_no_hand();

        let mut outcome = FrameOutcome::default();
        if let Some(percentage) = self.distance.update(hands, now) {
            self.volume.set(percentage);
            dispatch(&mut self.audio, AudioAction::SetVolume(percentage));
            outcome.actions.push(AudioAction::SetVolume(percentage));
        }
        Ok(outcome)
    }

    fn handle_single_hand(
        &mut self,
        hand: &DetectedHand,
        (width, height): (u32, u32),
    ) -> Result<FrameOutcome> {
        let landmark_list = calc_landmark_list(hand, width, height);
        let landmark_vector = pre_process_landmark(&landmark_list);
        if landmark_vector.len() != KEYPOINT_INPUT_LEN {
            return Err(PipelineError::LandmarkLength {
                expected: KEYPOINT_INPUT_LEN,
                actual: landmark_vector.len(),
            }
            .into());
        }

        let hand_sign_id = self.models.keypoint.classify(&landmark_vector)?;
        let hand_label = label_for(&self.models.keypoint_labels, "keypoint classifier", hand_sign_id)?;

        let fingertip = landmark_list
            .get(INDEX_FINGER_TIP)
            .copied()
            .unwrap_or(PixelPoint::SENTINEL);
        let finger_gesture_id = self.smoother.observe_hand(
            hand_sign_id == self.pointer_id,
            fingertip,
            (width, height),
            self.models.point_history.as_mut(),
        )?;
        let finger_label = label_for(
            &self.models.point_history_labels,
            "point history classifier",
            finger_gesture_id,
        )?;

        let actions = self.state_machine.update(
            HandState::from_label(&hand_label),
            FingerGesture::from_label(&finger_label),
            &mut self.volume,
        );
        for &action in &actions {
            dispatch(&mut self.audio, action);
        }

        Ok(FrameOutcome {
            hand_label: Some(hand_label),
            finger_label: Some(finger_label),
            actions,
        })
    }

    /// Process frames until the source runs dry, a read fails or `exit` is triggered.
    pub fn run<S, D>(
        &mut self,
        source: &mut S,
        detector: &mut D,
        exit: &ExitSignal,
        status: &StatusLine,
    ) -> Result<()>
    where
        S: FrameSource + ?Sized,
        D: HandDetector + ?Sized,
    {
        let mut fps = FpsCalc::new(FPS_BUFFER_LEN);

        loop {
            if exit.is_triggered() {
                log::info!("exit requested, stopping");
                break;
            }

            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("frame source exhausted");
                    break;
                }
                Err(err) => {
                    log::warn!("failed to read frame: {err:?}");
                    break;
                }
            };
            let current_fps = fps.tick(Instant::now());

            let hands = match detector.detect(&frame) {
                Ok(hands) => hands,
                Err(err) => {
                    log::warn!("hand detection failed, skipping frame: {err:?}");
                    continue;
                }
            };

            let outcome = self.handle_hands(&hands, (frame.width, frame.height), frame.timestamp)?;
            status.update(
                self.volume.percentage(),
                outcome.hand_label.as_deref().unwrap_or("-"),
                outcome.finger_label.as_deref().unwrap_or("-"),
                current_fps,
            );
        }

        Ok(())
    }
}

fn label_for(labels: &LabelSet, model: &'static str, id: usize) -> Result<String> {
    labels.get(id).map(str::to_string).ok_or_else(|| {
        PipelineError::UnknownLabel {
            model,
            id,
            len: labels.len(),
        }
        .into()
    })
}

/// Load everything, then run the loop until it ends or `exit` fires.
pub fn start(config: ControlConfig, exit: ExitSignal) -> Result<()> {
    let models = GestureModels::load(&config).context("failed to load gesture classifiers")?;
    let audio = create_backend(config.driver, config.dry_run);
    let mut control = GestureControl::new(&config, models, audio);

    let mut detector = OrtHandDetector::new(
        &config.model_dir,
        config.max_hands,
        config.min_detection_confidence,
        config.min_tracking_confidence,
    )
    .context("failed to load hand detector")?;

    let mut source = open_source(&config)?;
    let status = StatusLine::new(config.headless);
    let result = control.run(source.as_mut(), &mut detector, &exit, &status);
    status.finish();
    result
}

fn open_source(config: &ControlConfig) -> Result<Box<dyn FrameSource>> {
    match &config.replay {
        Some(dir) => Ok(Box::new(ImageSequenceSource::open(dir)?)),
        None => open_camera(config),
    }
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(config: &ControlConfig) -> Result<Box<dyn FrameSource>> {
    let camera = crate::pipeline::CameraSource::open(config.device, config.width, config.height)
        .context("failed to open camera")?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(_config: &ControlConfig) -> Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "built without camera support, pass --replay <DIR> to read frames from images"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::DryRunBackend,
        types::{Frame, Handedness},
    };
    use std::{collections::VecDeque, time::Duration};

    const FRAME: (u32, u32) = (640, 480);

    /// Returns ids from a fixed script, repeating the last one.
    struct ScriptedClassifier {
        ids: VecDeque<usize>,
        last: usize,
    }

    impl Classifier for ScriptedClassifier {
        fn classify(&mut self, _input: &[f32]) -> Result<usize> {
            if let Some(id) = self.ids.pop_front() {
                self.last = id;
            }
            Ok(self.last)
        }
    }

    fn scripted(ids: &[usize]) -> Box<dyn Classifier> {
        Box::new(ScriptedClassifier {
            ids: ids.iter().copied().collect(),
            last: 0,
        })
    }

    fn models(hand_signs: &[usize], finger_gestures: &[usize]) -> GestureModels {
        GestureModels {
            keypoint: scripted(hand_signs),
            keypoint_labels: LabelSet::new(["Open", "Close", "Pointer", "OK"]),
            point_history: scripted(finger_gestures),
            point_history_labels: LabelSet::new([
                "Stop",
                "Clockwise",
                "Counter Clockwise",
                "Move",
            ]),
        }
    }

    fn config() -> ControlConfig {
        ControlConfig {
            history_length: 2,
            ..ControlConfig::default()
        }
    }

    fn control(hand_signs: &[usize], finger_gestures: &[usize]) -> GestureControl<DryRunBackend> {
        GestureControl::new(
            &config(),
            models(hand_signs, finger_gestures),
            DryRunBackend::default(),
        )
    }

    fn hand(handedness: Handedness, pinch: f32) -> DetectedHand {
        let landmarks = (0..21)
            .map(|i| [0.3 + 0.01 * i as f32, 0.4 + 0.005 * i as f32, 0.0])
            .collect();
        let mut world_landmarks = vec![[0.0; 3]; 21];
        world_landmarks[INDEX_FINGER_TIP] = [pinch, 0.0, 0.0];
        DetectedHand {
            landmarks,
            world_landmarks,
            handedness,
            score: 0.9,
        }
    }

    /// Records actions, can fail every call and can report a level.
    #[derive(Default)]
    struct ScriptedBackend {
        fail: bool,
        level: Option<u8>,
        calls: Vec<AudioAction>,
    }

    impl ScriptedBackend {
        fn record(&mut self, action: AudioAction) -> Result<()> {
            self.calls.push(action);
            if self.fail {
                anyhow::bail!("mixer unavailable");
            }
            Ok(())
        }
    }

    impl AudioBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn play(&mut self) -> Result<()> {
            self.record(AudioAction::Play)
        }
        fn pause(&mut self) -> Result<()> {
            self.record(AudioAction::Pause)
        }
        fn stop(&mut self) -> Result<()> {
            self.record(AudioAction::Stop)
        }
        fn toggle(&mut self) -> Result<()> {
            self.record(AudioAction::Toggle)
        }
        fn next(&mut self) -> Result<()> {
            self.record(AudioAction::Next)
        }
        fn previous(&mut self) -> Result<()> {
            self.record(AudioAction::Previous)
        }
        fn mute(&mut self) -> Result<()> {
            self.record(AudioAction::Mute)
        }
        fn unmute(&mut self) -> Result<()> {
            self.record(AudioAction::Unmute)
        }
        fn up(&mut self) -> Result<()> {
            self.record(AudioAction::Up)
        }
        fn down(&mut self) -> Result<()> {
            self.record(AudioAction::Down)
        }
        fn set_volume(&mut self, percentage: u8) -> Result<()> {
            self.record(AudioAction::SetVolume(percentage))
        }
        fn current_volume(&mut self) -> Result<Option<u8>> {
            if self.fail {
                anyhow::bail!("mixer unavailable");
            }
            Ok(self.level)
        }
    }

    #[test]
    fn test_no_hand_pushes_sentinel() {
        let mut control = control(&[1], &[0]);
        let outcome = control.handle_hands(&[], FRAME, Instant::now()).unwrap();

        assert_eq!(outcome, FrameOutcome::default());
        assert_eq!(
            control.smoother.point_history().to_vec(),
            vec![PixelPoint::SENTINEL]
        );
        assert_eq!(control.smoother.finger_gesture_history().len(), 0);
    }

    #[test]
    fn test_no_hand_frame_keeps_previous_hand_state() {
        let mut control = control(&[1], &[0]);
        let now = Instant::now();

        control
            .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, now)
            .unwrap();
        assert_eq!(control.state_machine.previous_hand_state(), HandState::Close);

        let outcome = control.handle_hands(&[], FRAME, now).unwrap();
        assert!(outcome.actions.is_empty());
        assert_eq!(control.state_machine.previous_hand_state(), HandState::Close);
        assert_eq!(
            control.smoother.point_history().back(),
            Some(&PixelPoint::SENTINEL)
        );

        // Close is still the previous state, so showing it again does not re-pause.
        let outcome = control
            .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, now)
            .unwrap();
        assert!(outcome.actions.is_empty());
        assert_eq!(control.audio.history(), &[AudioAction::Pause]);
    }

    #[test]
    fn test_close_pauses_once() {
        let mut control = control(&[1], &[0]);
        let now = Instant::now();
        for _ in 0..3 {
            control
                .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, now)
                .unwrap();
        }
        assert_eq!(control.audio.history(), &[AudioAction::Pause]);
    }

    #[test]
    fn test_open_after_close_plays() {
        let mut control = control(&[1, 0], &[0]);
        let now = Instant::now();
        let first = control
            .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, now)
            .unwrap();
        let second = control
            .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, now)
            .unwrap();

        assert_eq!(first.hand_label.as_deref(), Some("Close"));
        assert_eq!(second.hand_label.as_deref(), Some("Open"));
        assert_eq!(
            control.audio.history(),
            &[AudioAction::Pause, AudioAction::Play]
        );
    }

    #[test]
    fn test_pointer_circle_steps_volume_up() {
        let mut control = control(&[2], &[1]);
        let now = Instant::now();
        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(
                control
                    .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, now)
                    .unwrap(),
            );
        }

        assert_eq!(outcomes[0].actions, vec![AudioAction::Play]);
        assert_eq!(outcomes[1].finger_label.as_deref(), Some("Stop"));
        assert_eq!(outcomes[2].finger_label.as_deref(), Some("Clockwise"));
        assert_eq!(outcomes[2].actions, vec![AudioAction::Up]);
        assert_eq!(control.volume(), 51);
        assert!(control
            .smoother
            .point_history()
            .iter()
            .all(|p| *p != PixelPoint::SENTINEL));
    }

    #[test]
    fn test_two_hands_set_volume_after_delay() {
        let mut control = control(&[1], &[0]);
        let hands = [hand(Handedness::Left, 0.1), hand(Handedness::Right, 0.039)];
        let start = Instant::now();

        let armed = control.handle_hands(&hands, FRAME, start).unwrap();
        assert!(armed.actions.is_empty());

        let committed = control
            .handle_hands(&hands, FRAME, start + Duration::from_millis(500))
            .unwrap();
        assert_eq!(committed.actions, vec![AudioAction::SetVolume(30)]);
        assert_eq!(control.volume(), 30);
        assert_eq!(control.audio.history(), &[AudioAction::SetVolume(30)]);
        assert_eq!(
            control.smoother.point_history().to_vec(),
            vec![PixelPoint::SENTINEL, PixelPoint::SENTINEL]
        );
        assert_eq!(control.state_machine.previous_hand_state(), HandState::Other);
    }

    #[test]
    fn test_two_left_hands_do_nothing() {
        let mut control = control(&[1], &[0]);
        let hands = [hand(Handedness::Left, 0.1), hand(Handedness::Left, 0.05)];
        let start = Instant::now();
        control.handle_hands(&hands, FRAME, start).unwrap();
        let outcome = control
            .handle_hands(&hands, FRAME, start + Duration::from_secs(1))
            .unwrap();
        assert!(outcome.actions.is_empty());
        assert!(control.audio.history().is_empty());
    }

    #[test]
    fn test_backend_failure_is_swallowed() {
        let backend = ScriptedBackend {
            fail: true,
            ..ScriptedBackend::default()
        };
        let mut control = GestureControl::new(&config(), models(&[1], &[0]), backend);
        assert_eq!(control.volume(), 50);

        let outcome = control
            .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, Instant::now())
            .unwrap();
        assert_eq!(outcome.actions, vec![AudioAction::Pause]);
        assert_eq!(control.audio.calls, vec![AudioAction::Pause]);
    }

    #[test]
    fn test_initial_volume_from_backend() {
        let backend = ScriptedBackend {
            level: Some(70),
            ..ScriptedBackend::default()
        };
        let control = GestureControl::new(&config(), models(&[1], &[0]), backend);
        assert_eq!(control.volume(), 70);
    }

    #[test]
    fn test_unknown_class_id_is_fatal() {
        let mut control = control(&[9], &[0]);
        let err = control
            .handle_hands(&[hand(Handedness::Right, 0.0)], FRAME, Instant::now())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::UnknownLabel { id: 9, len: 4, .. })
        ));
    }

    #[test]
    fn test_pointer_id_follows_label_file() {
        let mut models = models(&[0], &[0]);
        models.keypoint_labels = LabelSet::new(["Pointer", "Open"]);
        let control = GestureControl::new(&config(), models, DryRunBackend::default());
        assert_eq!(control.pointer_id, 0);
    }

    struct VecSource {
        frames: usize,
        reads: usize,
    }

    impl FrameSource for VecSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            self.reads += 1;
            if self.reads > self.frames {
                return Ok(None);
            }
            Ok(Some(Frame {
                rgba: vec![0; 4 * 4 * 4],
                width: 4,
                height: 4,
                timestamp: Instant::now(),
            }))
        }
    }

    /// Fails on the listed calls and otherwise reports one closed hand.
    struct FlakyDetector {
        calls: usize,
        fail_on: Vec<usize>,
    }

    impl HandDetector for FlakyDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedHand>> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                anyhow::bail!("inference failed");
            }
            Ok(vec![hand(Handedness::Right, 0.0)])
        }
    }

    #[test]
    fn test_run_until_source_exhausted() {
        let mut control = control(&[1, 0], &[0]);
        let mut source = VecSource {
            frames: 3,
            reads: 0,
        };
        let mut detector = FlakyDetector {
            calls: 0,
            fail_on: vec![2],
        };

        control
            .run(
                &mut source,
                &mut detector,
                &ExitSignal::new(),
                &StatusLine::new(true),
            )
            .unwrap();

        assert_eq!(source.reads, 4);
        assert_eq!(detector.calls, 3);
        assert_eq!(
            control.audio.history(),
            &[AudioAction::Pause, AudioAction::Play]
        );
    }

    #[test]
    fn test_run_stops_on_exit_signal() {
        let mut control = control(&[1], &[0]);
        let mut source = VecSource {
            frames: 10,
            reads: 0,
        };
        let mut detector = FlakyDetector {
            calls: 0,
            fail_on: Vec::new(),
        };
        let exit = ExitSignal::new();
        exit.trigger();

        control
            .run(&mut source, &mut detector, &exit, &StatusLine::new(true))
            .unwrap();
        assert_eq!(source.reads, 0);
        assert!(control.audio.history().is_empty());
    }
}
