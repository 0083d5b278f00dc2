//! Audio backends the gesture loop drives.
//!
//! Every call is best effort: [`dispatch`] logs a failing backend call and
//! carries on so a broken mixer never stalls gesture processing.

mod dry_run;
mod linux;

use anyhow::Result;

pub use dry_run::DryRunBackend;
pub use linux::{CommandBackend, MixerDriver};

/// One discrete command produced by the gesture logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioAction {
    Play,
    Pause,
    Stop,
    Toggle,
    Next,
    Previous,
    Mute,
    Unmute,
    Up,
    Down,
    SetVolume(u8),
}

impl AudioAction {
    pub fn apply<A: AudioBackend + ?Sized>(self, backend: &mut A) -> Result<()> {
        match self {
            AudioAction::Play => backend.play(),
            AudioAction::Pause => backend.pause(),
            AudioAction::Stop => backend.stop(),
            AudioAction::Toggle => backend.toggle(),
            AudioAction::Next => backend.next(),
            AudioAction::Previous => backend.previous(),
            AudioAction::Mute => backend.mute(),
            AudioAction::Unmute => backend.unmute(),
            AudioAction::Up => backend.up(),
            AudioAction::Down => backend.down(),
            AudioAction::SetVolume(percentage) => backend.set_volume(percentage),
        }
    }
}

pub trait AudioBackend {
    fn name(&self) -> &'static str;

    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn toggle(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<()>;
    fn previous(&mut self) -> Result<()>;
    fn mute(&mut self) -> Result<()>;
    fn unmute(&mut self) -> Result<()>;
    fn up(&mut self) -> Result<()>;
    fn down(&mut self) -> Result<()>;
    fn set_volume(&mut self, percentage: u8) -> Result<()>;

    /// Current output level, when the backend can read it back.
    fn current_volume(&mut self) -> Result<Option<u8>> {
        Ok(None)
    }
}

impl<T: AudioBackend + ?Sized> AudioBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) -> Result<()> {
        (**self).pause()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn toggle(&mut self) -> Result<()> {
        (**self).toggle()
    }

    fn next(&mut self) -> Result<()> {
        (**self).next()
    }

    fn previous(&mut self) -> Result<()> {
        (**self).previous()
    }

    fn mute(&mut self) -> Result<()> {
        (**self).mute()
    }

    fn unmute(&mut self) -> Result<()> {
        (**self).unmute()
    }

    fn up(&mut self) -> Result<()> {
        (**self).up()
    }

    fn down(&mut self) -> Result<()> {
        (**self).down()
    }

    fn set_volume(&mut self, percentage: u8) -> Result<()> {
        (**self).set_volume(percentage)
    }

    fn current_volume(&mut self) -> Result<Option<u8>> {
        (**self).current_volume()
    }
}

/// Fire an action and swallow any failure.
pub fn dispatch<A: AudioBackend + ?Sized>(backend: &mut A, action: AudioAction) {
    log::debug!("audio action {action:?} via {}", backend.name());
    if let Err(err) = action.apply(backend) {
        log::warn!("{} failed to {action:?}: {err:?}", backend.name());
    }
}

pub fn create_backend(driver: MixerDriver, dry_run: bool) -> Box<dyn AudioBackend> {
    if dry_run {
        log::info!("audio actions will only be logged (dry run)");
        Box::new(DryRunBackend::default())
    } else {
        log::info!("audio backend: playerctl + {}", driver.label());
        Box::new(CommandBackend::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Default)]
    struct FailingBackend {
        attempts: usize,
    }

    impl FailingBackend {
        fn fail(&mut self) -> Result<()> {
            self.attempts += 1;
            Err(anyhow!("mixer unavailable"))
        }
    }

    impl AudioBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn play(&mut self) -> Result<()> {
            self.fail()
        }
        fn pause(&mut self) -> Result<()> {
            self.fail()
        }
        fn stop(&mut self) -> Result<()> {
            self.fail()
        }
        fn toggle(&mut self) -> Result<()> {
            self.fail()
        }
        fn next(&mut self) -> Result<()> {
            self.fail()
        }
        fn previous(&mut self) -> Result<()> {
            self.fail()
        }
        fn mute(&mut self) -> Result<()> {
            self.fail()
        }
        fn unmute(&mut self) -> Result<()> {
            self.fail()
        }
        fn up(&mut self) -> Result<()> {
            self.fail()
        }
        fn down(&mut self) -> Result<()> {
            self.fail()
        }
        fn set_volume(&mut self, _percentage: u8) -> Result<()> {
            self.fail()
        }
    }

    #[test]
    fn test_dispatch_swallows_errors() {
        let mut backend = FailingBackend::default();
        dispatch(&mut backend, AudioAction::Play);
        dispatch(&mut backend, AudioAction::SetVolume(30));
        assert_eq!(backend.attempts, 2);
    }

    #[test]
    fn test_apply_routes_to_backend() {
        let mut backend = DryRunBackend::default();
        for action in [
            AudioAction::Play,
            AudioAction::Up,
            AudioAction::SetVolume(70),
            AudioAction::Next,
        ] {
            action.apply(&mut backend).unwrap();
        }
        assert_eq!(
            backend.history(),
            &[
                AudioAction::Play,
                AudioAction::Up,
                AudioAction::SetVolume(70),
                AudioAction::Next,
            ]
        );
    }

    #[test]
    fn test_boxed_backend_delegates() {
        let mut backend: Box<dyn AudioBackend> = create_backend(MixerDriver::Alsa, true);
        assert_eq!(backend.name(), "dry-run");
        dispatch(&mut backend, AudioAction::Mute);
        assert_eq!(backend.current_volume().unwrap(), None);
    }
}
