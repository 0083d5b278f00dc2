use anyhow::Result;

use super::{AudioAction, AudioBackend};

/// Logs actions instead of touching the system; keeps what it was asked to do.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    history: Vec<AudioAction>,
}

impl DryRunBackend {
    pub fn history(&self) -> &[AudioAction] {
        &self.history
    }

    fn record(&mut self, action: AudioAction) -> Result<()> {
        log::info!("[dry-run] {action:?}");
        self.history.push(action);
        Ok(())
    }
}

impl AudioBackend for DryRunBackend {
    fn name(&self) -> &'static str {
        "dry-run"
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
}
