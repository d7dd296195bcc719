//! Reset command implementation

use crate::context::AppContext;
use crate::error::Result;
use tracing::info;

/// Flag a library for a hard reset on its next run.
///
/// Returns false when the library has never been indexed; its first run is
/// already a full rebuild.
pub async fn cmd_reset(ctx: &AppContext, library_id: &str) -> Result<bool> {
    let flagged = ctx.meta.set_force_reindex(library_id).await?;
    if flagged {
        info!(library_id = %library_id, "Hard reset scheduled");
    } else {
        info!(library_id = %library_id, "Library not indexed, nothing to reset");
    }
    Ok(flagged)
}

pub fn print_reset(library_id: &str, flagged: bool) {
    if flagged {
        println!(
            "✓ Library {} will be rebuilt from scratch on its next index run",
            library_id
        );
    } else {
        println!("Library {} has not been indexed; nothing to reset", library_id);
    }
}
