//! Single-slot transient notification

/// Popup shown over the host list
///
/// Holds at most one message. A new message replaces the pending one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopupState {
    open: bool,
    message: String,
}

impl PopupState {
    pub fn show(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.open = true;
    }

    pub fn dismiss(&mut self) {
        self.open = false;
        self.message.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Visible message, if any
    pub fn message(&self) -> Option<&str> {
        self.open.then_some(self.message.as_str())
    }
}
