//! Desktop audio through stock command-line tools: `playerctl` for MPRIS
//! media players and `amixer` or `pactl` for the master volume.

use std::{process::Command, str::FromStr};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;

use super::AudioBackend;

const PLAYERCTL: &str = "playerctl";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("unsupported mixer driver `{0}` (expected `alsa` or `pulse`)")]
    UnsupportedDriver(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MixerDriver {
    #[default]
    Alsa,
    Pulse,
}

impl MixerDriver {
    pub fn label(&self) -> &'static str {
        match self {
            MixerDriver::Alsa => "alsa",
            MixerDriver::Pulse => "pulse",
        }
    }

    fn mute_command(&self, muted: bool) -> (&'static str, Vec<String>) {
        match self {
            MixerDriver::Alsa => (
                "amixer",
                args(&["set", "Master", "-q", if muted { "mute" } else { "unmute" }]),
            ),
            MixerDriver::Pulse => (
                "pactl",
                args(&["set-sink-mute", "@DEFAULT_SINK@", if muted { "1" } else { "0" }]),
            ),
        }
    }

    fn volume_command(&self, level: &str) -> (&'static str, Vec<String>) {
        match self {
            MixerDriver::Alsa => ("amixer", args(&["set", "Master", "-q", level])),
            MixerDriver::Pulse => ("pactl", args(&["set-sink-volume", "@DEFAULT_SINK@", level])),
        }
    }

    fn query_command(&self) -> (&'static str, Vec<String>) {
        match self {
            MixerDriver::Alsa => ("amixer", args(&["get", "Master"])),
            MixerDriver::Pulse => ("pactl", args(&["get-sink-volume", "@DEFAULT_SINK@"])),
        }
    }

    fn step_up(&self) -> &'static str {
        match self {
            MixerDriver::Alsa => "1%+",
            MixerDriver::Pulse => "+1%",
        }
    }

    fn step_down(&self) -> &'static str {
        match self {
            MixerDriver::Alsa => "1%-",
            MixerDriver::Pulse => "-1%",
        }
    }
}

impl FromStr for MixerDriver {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alsa" => Ok(MixerDriver::Alsa),
            "pulse" | "pulseaudio" | "pipewire" => Ok(MixerDriver::Pulse),
            other => Err(AudioError::UnsupportedDriver(other.to_string())),
        }
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    fn parse(output: &str) -> Option<Self> {
        match output.trim() {
            "Playing" => Some(PlaybackStatus::Playing),
            "Paused" => Some(PlaybackStatus::Paused),
            "Stopped" => Some(PlaybackStatus::Stopped),
            _ => None,
        }
    }
}

/// Executes an external program and returns its stdout.
pub trait CommandRunner {
    fn run(&self, program: &str, argv: &[String]) -> Result<String>;
}

/// Spawns real processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, argv: &[String]) -> Result<String> {
        let output = Command::new(program)
            .args(argv)
            .output()
            .with_context(|| format!("failed to spawn {program}"))?;

        if !output.status.success() {
            return Err(AudioError::CommandFailed {
                command: format!("{program} {}", argv.join(" ")),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs `playerctl` and mixer commands.
///
/// Players paused by a gesture are remembered so a later play gesture
/// resumes exactly those and leaves players the user paused alone.
pub struct CommandBackend<R = SystemRunner> {
    driver: MixerDriver,
    runner: R,
    paused_players: Vec<String>,
}

impl CommandBackend {
    pub fn new(driver: MixerDriver) -> Self {
        Self::with_runner(driver, SystemRunner)
    }
}

impl<R: CommandRunner> CommandBackend<R> {
    pub fn with_runner(driver: MixerDriver, runner: R) -> Self {
        Self {
            driver,
            runner,
            paused_players: Vec::new(),
        }
    }

    fn run(&self, program: &str, argv: &[String]) -> Result<String> {
        self.runner.run(program, argv)
    }

    fn players(&self) -> Result<Vec<String>> {
        let output = self.run(PLAYERCTL, &args(&["--list-all"]))?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn status(&self, player: &str) -> Option<PlaybackStatus> {
        match self.run(PLAYERCTL, &args(&["--player", player, "status"])) {
            Ok(output) => PlaybackStatus::parse(&output),
            Err(err) => {
                log::debug!("could not read status of {player}: {err:?}");
                None
            }
        }
    }

    fn players_with<F>(&self, keep: F) -> Result<Vec<String>>
    where
        F: Fn(PlaybackStatus) -> bool,
    {
        Ok(self
            .players()?
            .into_iter()
            .filter(|player| self.status(player).is_some_and(&keep))
            .collect())
    }

    fn command_players(&self, players: &[String], verb: &str) -> Result<()> {
        for player in players {
            self.run(PLAYERCTL, &args(&["--player", player.as_str(), verb]))?;
        }
        Ok(())
    }

    fn mixer(&self, (program, argv): (&'static str, Vec<String>)) -> Result<()> {
        self.run(program, &argv).map(|_| ())
    }
}

impl<R: CommandRunner> AudioBackend for CommandBackend<R> {
    fn name(&self) -> &'static str {
        match self.driver {
            MixerDriver::Alsa => "playerctl+amixer",
            MixerDriver::Pulse => "playerctl+pactl",
        }
    }

    fn play(&mut self) -> Result<()> {
        // Players that fail to resume stay remembered for the next play gesture.
        let mut unresumed = Vec::new();
        let mut failures = Vec::new();
        for player in std::mem::take(&mut self.paused_players) {
            if self.status(&player) != Some(PlaybackStatus::Paused) {
                continue;
            }
            match self.run(PLAYERCTL, &args(&["--player", player.as_str(), "play"])) {
                Ok(_) => log::debug!("resumed {player}"),
                Err(err) => {
                    failures.push(format!("{player}: {err:#}"));
                    unresumed.push(player);
                }
            }
        }
        self.paused_players = unresumed;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("failed to resume {}", failures.join("; ")))
        }
    }

    fn pause(&mut self) -> Result<()> {
        let playing = self.players_with(|s| s == PlaybackStatus::Playing)?;
        if playing.is_empty() {
            return Ok(());
        }
        self.command_players(&playing, "pause")?;
        log::debug!("paused {}", playing.join(", "));
        self.paused_players = playing;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let active = self.players_with(|s| s != PlaybackStatus::Stopped)?;
        self.command_players(&active, "stop")
    }

    fn toggle(&mut self) -> Result<()> {
        if self.players_with(|s| s == PlaybackStatus::Playing)?.is_empty() {
            self.play()
        } else {
            self.pause()
        }
    }

    fn next(&mut self) -> Result<()> {
        let playing = self.players_with(|s| s == PlaybackStatus::Playing)?;
        self.command_players(&playing, "next")
    }

    fn previous(&mut self) -> Result<()> {
        let playing = self.players_with(|s| s == PlaybackStatus::Playing)?;
        self.command_players(&playing, "previous")
    }

    fn mute(&mut self) -> Result<()> {
        self.mixer(self.driver.mute_command(true))
    }

    fn unmute(&mut self) -> Result<()> {
        self.mixer(self.driver.mute_command(false))
    }

    fn up(&mut self) -> Result<()> {
        self.mixer(self.driver.volume_command(self.driver.step_up()))
    }

    fn down(&mut self) -> Result<()> {
        self.mixer(self.driver.volume_command(self.driver.step_down()))
    }

    fn set_volume(&mut self, percentage: u8) -> Result<()> {
        let level = format!("{}%", percentage.min(100));
        self.mixer(self.driver.volume_command(&level))
    }

    fn current_volume(&mut self) -> Result<Option<u8>> {
        let (program, argv) = self.driver.query_command();
        let output = self.run(program, &argv)?;
        Ok(parse_volume_percentage(&output))
    }
}

/// First `NN%` figure in mixer output (`[NN%]` for amixer, `/ NN% /` for pactl).
pub fn parse_volume_percentage(output: &str) -> Option<u8> {
    let mut chunks: Vec<&str> = output.split('%').collect();
    // The text after the last '%' is not followed by one.
    chunks.pop();
    chunks.into_iter().find_map(|chunk| {
        // Digits are single bytes, so the byte after the last non-digit is a char boundary.
        let start = chunk
            .bytes()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |idx| idx + 1);
        chunk[start..].parse::<u32>().ok().map(|v| v.min(100) as u8)
    })
}
