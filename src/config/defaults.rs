//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [course] Section Defaults
// ============================================================================

pub mod course {
    pub fn name() -> String {
        "<COURSE_NAME>".into()
    }

    pub fn url() -> String {
        "/".into()
    }
}

// ============================================================================
// [sync] Section Defaults
// ============================================================================

pub mod sync {
    use std::path::PathBuf;

    /// Image formats recognized as course assets.
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "gif", "webp", "avif"];

    pub fn content() -> PathBuf {
        "src/sections".into()
    }

    pub fn extensions() -> Vec<String> {
        IMAGE_EXTENSIONS.iter().map(|&ext| ext.to_owned()).collect()
    }

    pub mod destination {
        use std::path::PathBuf;

        pub fn development() -> PathBuf {
            "public/assets".into()
        }

        pub fn production() -> PathBuf {
            "dist/assets".into()
        }
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    use std::path::PathBuf;

    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        5173
    }

    pub fn root() -> PathBuf {
        "public".into()
    }
}
