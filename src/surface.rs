//! Text surface: where selected text comes from and where results go

use anyhow::{Context, Result};

/// Reads the user's selection and places rewritten text
pub trait TextSurface {
    fn read_selection(&mut self) -> Result<Option<String>>;
    fn write_result(&mut self, text: &str) -> Result<()>;
}

/// Uses the system clipboard as the exchange point
pub struct ClipboardSurface {
    clipboard: arboard::Clipboard,
}

impl ClipboardSurface {
    pub fn new() -> Result<Self> {
        let clipboard = arboard::Clipboard::new().context("failed to open clipboard")?;
        Ok(Self { clipboard })
    }
}

impl TextSurface for ClipboardSurface {
    fn read_selection(&mut self) -> Result<Option<String>> {
        match self.clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(e).context("failed to read clipboard"),
        }
    }

    fn write_result(&mut self, text: &str) -> Result<()> {
        self.clipboard
            .set_text(text.to_string())
            .context("failed to write clipboard")
    }
}
