use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// `--verbose` turns on editor diagnostics down to debug level: rejected
/// edits on locked regions, discarded grid tickets, collaborator calls.
/// They go to stderr so the template JSON on stdout stays parseable.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .without_time()
        .try_init();
    Ok(())
}
