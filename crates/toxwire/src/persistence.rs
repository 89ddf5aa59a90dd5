//! Saving and restoring engine state.
//!
//! The blob is opaque: its layout belongs to the engine.

use tracing::debug;

use crate::error::{ArgumentError, Result};
use crate::session::Session;
use crate::translate;

impl Session {
    /// Size in bytes of the blob [`Session::save`] would produce
    pub fn save_size(&self) -> Result<usize> {
        self.with_engine(|engine| Ok(engine.size() as usize))
    }

    /// Snapshot the engine state
    pub fn save(&self) -> Result<Vec<u8>> {
        self.with_engine(|engine| {
            let mut blob = vec![0u8; engine.size() as usize];
            engine.save(&mut blob);
            debug!(bytes = blob.len(), "State saved");
            Ok(blob)
        })
    }

    /// Replace the engine state with a blob from [`Session::save`].
    ///
    /// Either the whole blob is applied or the state is left untouched.
    pub fn load(&self, blob: &[u8]) -> Result<()> {
        self.with_engine(|engine| {
            if blob.is_empty() {
                return Err(ArgumentError::Empty { field: "state blob" }.into());
            }
            translate::status(engine.load(blob), "load")?;
            debug!(bytes = blob.len(), "State loaded");
            Ok(())
        })
    }
}
