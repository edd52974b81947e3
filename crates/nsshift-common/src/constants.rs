//! System-wide constants and default paths.

/// Shadow subordinate-uid database, relative to a rootfs.
pub const SUBUID_FILE: &str = "etc/subuid";

/// Shadow subordinate-gid database, relative to a rootfs.
pub const SUBGID_FILE: &str = "etc/subgid";

/// Kernel uid map of the calling process.
pub const PROC_SELF_UID_MAP: &str = "/proc/self/uid_map";

/// Kernel gid map of the calling process.
pub const PROC_SELF_GID_MAP: &str = "/proc/self/gid_map";

/// Host-side start of the hard-coded fallback map.
pub const FALLBACK_HOST_ID: i64 = 1_000_000;

/// Length of the hard-coded fallback map.
pub const FALLBACK_MAP_RANGE: i64 = 1_000_000_000;

/// Ids below this belong to the system's own POSIX allocation and are
/// never handed to containers by the kernel-default resolver.
pub const SYSTEM_ID_CEILING: u32 = 100_000;

/// Minimum span a delegated range must keep after clamping.
pub const MIN_DELEGATED_SPAN: u32 = 65_536;

/// Inclusive end of the full 32-bit kernel range (`0 0 4294967295`).
pub const FULL_RANGE_END: u32 = 4_294_967_294;

/// Application name used in CLI output.
pub const APP_NAME: &str = "nsshift";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "nsshift";
