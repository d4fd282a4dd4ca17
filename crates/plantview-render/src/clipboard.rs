//! Clipboard seam for preview exports

use crate::error::PreviewError;

/// Destination for clipboard exports
///
/// The preview controller only talks to this trait, so exports can be
/// exercised without a desktop session.
pub trait ClipboardSink {
    /// Put text (SVG markup) on the clipboard
    fn set_text(&mut self, text: &str) -> Result<(), PreviewError>;

    /// Put straight RGBA pixels on the clipboard
    fn set_image(&mut self, width: usize, height: usize, rgba: &[u8]) -> Result<(), PreviewError>;
}

/// The system clipboard, via arboard
///
/// On Linux the contents live only as long as the process that owns them.
/// A short-lived process should call [`SystemClipboard::hand_off`] so the
/// write blocks until another application has taken ownership.
#[cfg(feature = "clipboard")]
pub struct SystemClipboard {
    inner: arboard::Clipboard,
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    hand_off: bool,
}

#[cfg(feature = "clipboard")]
impl SystemClipboard {
    pub fn new() -> Result<Self, PreviewError> {
        arboard::Clipboard::new()
            .map(|inner| Self {
                inner,
                hand_off: false,
            })
            .map_err(|e| PreviewError::Clipboard(format!("Failed to access clipboard: {}", e)))
    }

    /// Keep serving the contents until another application replaces them
    ///
    /// Only changes behaviour on Linux; elsewhere the OS keeps the data.
    pub fn hand_off(mut self) -> Self {
        self.hand_off = true;
        self
    }

    /// Whether writes wait for another owner
    pub fn waits_for_owner(&self) -> bool {
        cfg!(target_os = "linux") && self.hand_off
    }

    fn setter(&mut self) -> arboard::Set<'_> {
        let set = self.inner.set();
        #[cfg(target_os = "linux")]
        let set = if self.hand_off {
            use arboard::SetExtLinux;
            set.wait()
        } else {
            set
        };
        set
    }
}

#[cfg(feature = "clipboard")]
impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), PreviewError> {
        self.setter()
            .text(text.to_string())
            .map_err(|e| PreviewError::Clipboard(e.to_string()))
    }

    fn set_image(&mut self, width: usize, height: usize, rgba: &[u8]) -> Result<(), PreviewError> {
        // arboard expects RGBA pixel data, not encoded PNG
        let image = arboard::ImageData {
            width,
            height,
            bytes: std::borrow::Cow::Borrowed(rgba),
        };
        self.setter()
            .image(image)
            .map_err(|e| PreviewError::Clipboard(e.to_string()))
    }
}
