use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Cooperative stop flag checked at the top of every loop iteration.
#[derive(Clone, Debug, Default)]
pub struct ExitSignal {
    flag: Arc<AtomicBool>,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag on SIGINT and SIGTERM.
    pub fn register_os_signals(&self) -> io::Result<()> {
        signal_hook::flag::register(SIGINT, self.flag.clone())?;
        signal_hook::flag::register(SIGTERM, self.flag.clone())?;
        Ok(())
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_shared_between_clones() {
        let exit = ExitSignal::new();
        let observer = exit.clone();
        assert!(!observer.is_triggered());
        exit.trigger();
        assert!(observer.is_triggered());
    }
}
