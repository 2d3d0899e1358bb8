use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,netprobe=debug";

#[derive(Debug, Clone, Copy)]
pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
    /// The terminal UI owns stdout/stderr and no file was requested.
    Off,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global tracing subscriber.
pub fn init_logging(target: LogTarget<'_>) -> Result<()> {
    match target {
        LogTarget::Off => Ok(()),
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .init();
            Ok(())
        }
        LogTarget::File(path) => {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = fs::OpenOptions::new().create(true).append(true).open(path)?;

            // Each event gets its own handle to the same append-mode file.
            struct FileMakeWriter(fs::File);

            impl<'a> MakeWriter<'a> for FileMakeWriter {
                type Writer = Box<dyn std::io::Write + 'a>;

                fn make_writer(&'a self) -> Self::Writer {
                    match self.0.try_clone() {
                        Ok(file) => Box::new(file),
                        Err(_) => Box::new(std::io::sink()),
                    }
                }
            }

            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(BoxMakeWriter::new(FileMakeWriter(file)))
                .with_ansi(false)
                .init();

            tracing::info!("netprobe logging to {}", path.display());
            Ok(())
        }
    }
}
