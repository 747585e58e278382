//! Wiring shared by every command: config, store, transport, clock.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use epochtap_core::storage::{data_dir, open_store};
use epochtap_core::{Config, ConsoleTransport, EpochEngine, SnapshotStore, SystemClock, Tracker};

pub struct Context {
    pub config: Config,
    pub data_dir: PathBuf,
    pub tracker: Arc<Tracker>,
}

/// Where delivered status messages go.
pub enum Output {
    /// Render text to stdout.
    Console,
    /// Drop the rendered text; the caller prints its own output.
    Silent,
}

impl Context {
    pub fn open(output: Output) -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = data_dir()?;
        let config = Config::load()?;
        let store: Arc<dyn SnapshotStore> = Arc::from(open_store(&config.storage, &data_dir)?);

        let writer: Box<dyn Write + Send> = match output {
            Output::Console => Box::new(std::io::stdout()),
            Output::Silent => Box::new(std::io::sink()),
        };
        let tracker = Tracker::new(
            store,
            Arc::new(ConsoleTransport::new(writer)),
            Arc::new(SystemClock),
            EpochEngine::new(config.cycle),
        )
        .with_notify_on_activate(config.notifications.enabled_on_activate);

        Ok(Self {
            config,
            data_dir,
            tracker: Arc::new(tracker),
        })
    }
}
