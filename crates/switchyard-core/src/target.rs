#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Windows,
    Linux,
    Macos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostArch {
    X86_64,
    Aarch64,
    X86,
}

/// Operating system and CPU architecture the release artifacts are chosen
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTarget {
    pub os: HostOs,
    pub arch: HostArch,
}

impl HostTarget {
    #[must_use]
    pub const fn new(os: HostOs, arch: HostArch) -> Self {
        Self { os, arch }
    }

    /// The target this binary was compiled for, or `None` on platforms no
    /// runtime publishes builds for.
    #[must_use]
    pub fn current() -> Option<Self> {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    #[must_use]
    pub fn from_consts(os: &str, arch: &str) -> Option<Self> {
        let os = match os {
            "windows" => HostOs::Windows,
            "linux" => HostOs::Linux,
            "macos" => HostOs::Macos,
            _ => return None,
        };
        let arch = match arch {
            "x86_64" => HostArch::X86_64,
            "aarch64" => HostArch::Aarch64,
            "x86" => HostArch::X86,
            _ => return None,
        };
        Some(Self { os, arch })
    }

    #[must_use]
    pub const fn is_windows(self) -> bool {
        matches!(self.os, HostOs::Windows)
    }

    /// Windows ships zip archives; everything else ships gzipped tarballs.
    #[must_use]
    pub const fn archive_extension(self) -> &'static str {
        if self.is_windows() { "zip" } else { "tar.gz" }
    }
}
