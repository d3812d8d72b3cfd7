//! Input-monitoring permission check
//!
//! The daemon only checks the grant; asking the user for it is the job of
//! the menu bar app.

/// Reports whether the process may install a low-level input tap
pub trait InputPermission: Send + Sync {
    fn is_granted(&self) -> bool;
}

/// Accessibility trust as reported by the OS
pub struct AccessibilityPermission;

#[cfg(target_os = "macos")]
#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
}

impl InputPermission for AccessibilityPermission {
    #[cfg(target_os = "macos")]
    fn is_granted(&self) -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    #[cfg(not(target_os = "macos"))]
    fn is_granted(&self) -> bool {
        false
    }
}
