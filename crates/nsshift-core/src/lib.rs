//! # nsshift-core
//!
//! Identity-mapping primitives for Linux user namespaces:
//!
//! - **Ranges and map entries**: half-open range algebra and the ordered
//!   translation sets built from it.
//! - **Source readers**: shadow `subuid`/`subgid` databases and the
//!   kernel's `/proc/self/{uid,gid}_map`.
//! - **Default-map resolver**: reconciles shadow delegations, the current
//!   namespace, and a hard-coded fallback into the map a container starts
//!   with.
//! - **Filesystem shifter**: rewrites ownership, POSIX ACLs, and file
//!   capabilities of a tree to match a map, in either direction.
//! - **Spawn export**: the flat uid/gid tables a process spawner writes
//!   when creating a user namespace.
//!
//! All unsafe system calls are encapsulated in safe wrappers with proper
//! error handling and `// SAFETY:` documentation.

pub mod acl;
pub mod caps;
pub mod entry;
pub mod procmap;
pub mod range;
pub mod resolver;
pub mod set;
pub mod shadow;
pub mod shift;
pub mod spawn;
mod xattr;
