//! frostbox-secure: the secure buffer arena.
//!
//! Every password, key, and credential in frostbox lives in a [`SecureBytes`]
//! region: exclusively owned, zeroized on destruction, and registered in a
//! process-wide arena so that an interrupt handler can wipe whatever is still
//! alive before the process exits.
//!
//! Destruction is idempotent and happens exactly once per region along every
//! exit path: explicitly via [`SecureBytes::destroy`], implicitly on drop,
//! or collectively via [`wipe_all`].

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use rand::RngCore;
use zeroize::Zeroize;

use frostbox_core::{FbError, FbResult};

type Cell = Arc<Mutex<Option<Vec<u8>>>>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static Mutex<HashMap<u64, Weak<Mutex<Option<Vec<u8>>>>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Weak<Mutex<Option<Vec<u8>>>>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A poisoned lock still guards valid bytes; recover the guard so the wipe
/// paths cannot be blocked by an earlier panic.
fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// An exclusively-owned region of sensitive bytes.
///
/// Not `Clone`: secret material is never implicitly copied. `Debug` prints
/// a redaction marker. After destruction every read access fails with
/// [`FbError::Resource`].
pub struct SecureBytes {
    cell: Cell,
    id: u64,
}

impl SecureBytes {
    /// Allocate a zero-filled region of `n` bytes.
    pub fn alloc(n: usize) -> Self {
        Self::from_vec(vec![0u8; n])
    }

    /// Allocate a region of `n` cryptographically random bytes.
    pub fn random(n: usize) -> Self {
        let mut bytes = vec![0u8; n];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_vec(bytes)
    }

    /// Take ownership of an existing buffer. The caller must not retain
    /// copies of the data.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let cell: Cell = Arc::new(Mutex::new(Some(bytes)));
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        lock_recover(registry()).insert(id, Arc::downgrade(&cell));
        Self { cell, id }
    }

    /// Borrow the bytes for reading. Fails with `Resource` once destroyed.
    pub fn expose(&self) -> FbResult<Exposed<'_>> {
        let guard = lock_recover(&self.cell);
        if guard.is_none() {
            return Err(FbError::Resource("secure buffer already destroyed".into()));
        }
        Ok(Exposed(guard))
    }

    /// Number of live bytes; zero after destruction.
    pub fn len(&self) -> usize {
        lock_recover(&self.cell).as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_destroyed(&self) -> bool {
        lock_recover(&self.cell).is_none()
    }

    /// Zero-fill and release the region. Idempotent.
    pub fn destroy(&self) {
        let mut guard = lock_recover(&self.cell);
        if let Some(mut bytes) = guard.take() {
            bytes.zeroize();
        }
    }

    /// Narrow the region to `from..to`, destroying the bytes outside the
    /// window.
    pub fn trim(&self, from: usize, to: usize) -> FbResult<()> {
        let mut guard = lock_recover(&self.cell);
        let bytes = guard
            .as_mut()
            .ok_or_else(|| FbError::Resource("secure buffer already destroyed".into()))?;
        if from > to || to > bytes.len() {
            return Err(FbError::Format(format!(
                "trim window {from}..{to} out of range for {} bytes",
                bytes.len()
            )));
        }
        let mut narrowed = bytes[from..to].to_vec();
        bytes.zeroize();
        std::mem::swap(bytes, &mut narrowed);
        Ok(())
    }

    /// Constant-time equality, for password confirmation. Fails with
    /// `Resource` if either side was destroyed.
    pub fn ct_eq(&self, other: &SecureBytes) -> FbResult<bool> {
        let a = self.expose()?;
        let b = other.expose()?;
        if a.len() != b.len() {
            return Ok(false);
        }
        let mut diff = 0u8;
        for (x, y) in a.iter().zip(b.iter()) {
            diff |= x ^ y;
        }
        Ok(diff == 0)
    }
}

impl Drop for SecureBytes {
    fn drop(&mut self) {
        self.destroy();
        lock_recover(registry()).remove(&self.id);
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBytes")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Read guard over a live [`SecureBytes`] region.
pub struct Exposed<'a>(MutexGuard<'a, Option<Vec<u8>>>);

impl fmt::Debug for Exposed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Exposed").field(&"[REDACTED]").finish()
    }
}

impl Deref for Exposed<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }
}

/// Best-effort wipe of every still-live secure buffer in the process.
///
/// Invoked on normal completion and from the interrupt handler. Buffers
/// wiped here report `Resource` on any later access.
pub fn wipe_all() {
    let mut reg = lock_recover(registry());
    let mut wiped = 0usize;
    for (_, weak) in reg.drain() {
        if let Some(cell) = weak.upgrade() {
            let mut guard = lock_recover(&cell);
            if let Some(mut bytes) = guard.take() {
                bytes.zeroize();
                wiped += 1;
            }
        }
    }
    if wiped > 0 {
        tracing::debug!(buffers = wiped, "wiped live secure buffers");
    }
}

/// Number of registered, not-yet-destroyed buffers. Test and diagnostics
/// hook.
pub fn live_count() -> usize {
    let reg = lock_recover(registry());
    reg.values()
        .filter_map(Weak::upgrade)
        .filter(|cell| lock_recover(cell).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_zero_filled() {
        let buf = SecureBytes::alloc(16);
        assert_eq!(&*buf.expose().unwrap(), &[0u8; 16]);
    }

    #[test]
    fn test_random_buffers_differ() {
        let a = SecureBytes::random(32);
        let b = SecureBytes::random(32);
        assert_ne!(&*a.expose().unwrap(), &*b.expose().unwrap());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let buf = SecureBytes::from_vec(vec![7u8; 8]);
        buf.destroy();
        buf.destroy();
        assert!(buf.is_destroyed());
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_expose_after_destroy_fails() {
        let buf = SecureBytes::from_vec(vec![7u8; 8]);
        buf.destroy();
        match buf.expose() {
            Err(FbError::Resource(_)) => {}
            other => panic!("expected Resource error, got {other:?}"),
        };
    }

    #[test]
    fn test_trim_narrows_window() {
        let buf = SecureBytes::from_vec(b"hello world\n".to_vec());
        buf.trim(0, 11).unwrap();
        assert_eq!(&*buf.expose().unwrap(), b"hello world");
    }

    #[test]
    fn test_trim_out_of_range() {
        let buf = SecureBytes::from_vec(vec![1, 2, 3]);
        match buf.trim(2, 9) {
            Err(FbError::Format(_)) => {}
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn test_ct_eq() {
        let a = SecureBytes::from_vec(b"abc12345".to_vec());
        let b = SecureBytes::from_vec(b"abc12345".to_vec());
        let c = SecureBytes::from_vec(b"abc12346".to_vec());
        let d = SecureBytes::from_vec(b"abc1234".to_vec());
        assert!(a.ct_eq(&b).unwrap());
        assert!(!a.ct_eq(&c).unwrap());
        assert!(!a.ct_eq(&d).unwrap());
    }

    #[test]
    fn test_debug_is_redacted() {
        let buf = SecureBytes::from_vec(b"hunter2".to_vec());
        let printed = format!("{buf:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("REDACTED"));
    }
}
