//! Thin safe wrappers over the Linux extended-attribute syscalls.
//!
//! All calls use the `l*` variants so a final symlink is never followed.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

fn path_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

fn name_cstring(name: &str) -> io::Result<CString> {
    CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "xattr name contains a NUL byte"))
}

fn attribute_absent(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENODATA | libc::EOPNOTSUPP)
    )
}

/// Reads the named attribute. `Ok(None)` when the attribute is absent or
/// the filesystem has no xattr support.
pub(crate) fn lgetxattr(path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
    let c_path = path_cstring(path)?;
    let c_name = name_cstring(name)?;

    // SAFETY: both pointers reference NUL-terminated buffers that outlive
    // the call; a null value pointer with size 0 queries the length.
    let size = unsafe { libc::lgetxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0) };
    if size < 0 {
        let err = io::Error::last_os_error();
        return if attribute_absent(&err) {
            Ok(None)
        } else {
            Err(err)
        };
    }

    #[allow(clippy::cast_sign_loss)]
    let mut value = vec![0u8; size as usize];
    // SAFETY: value is a live buffer of the length passed alongside it.
    let read = unsafe {
        libc::lgetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_mut_ptr().cast(),
            value.len(),
        )
    };
    if read < 0 {
        let err = io::Error::last_os_error();
        return if attribute_absent(&err) {
            Ok(None)
        } else {
            Err(err)
        };
    }

    #[allow(clippy::cast_sign_loss)]
    value.truncate(read as usize);
    Ok(Some(value))
}

/// Writes the named attribute, creating or replacing it.
pub(crate) fn lsetxattr(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
    let c_path = path_cstring(path)?;
    let c_name = name_cstring(name)?;

    // SAFETY: all pointers reference live buffers; value.len() bounds the
    // read of the value buffer.
    let rc = unsafe {
        libc::lsetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
