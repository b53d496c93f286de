use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokensign_pkcs11_sys::{
    CK_FLAGS, CK_INVALID_HANDLE, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE, CK_SESSION_HANDLE,
    CK_SLOT_ID, CK_ULONG,
};
use tracing::{debug, trace};

use crate::{Attribute, Pkcs11Api, TResult};

/// Default capacity of the signature output buffer. Large enough for
/// any RSA signature a token will produce in practice; callers with
/// bigger keys override it per call.
pub const SIGNATURE_CAPACITY: usize = 1024;

/// A session opened on one slot of a token.
///
/// The session owns its handle: it is closed exactly once, either
/// through [`Session::close`] or on drop, whichever comes first. At
/// most one signing operation may be active on a session at a time;
/// callers sequence `sign_init` and `sign` accordingly.
pub struct Session<A: Pkcs11Api + ?Sized> {
    api: Arc<A>,
    handle: CK_SESSION_HANDLE,
    closed: AtomicBool,
}

impl<A: Pkcs11Api + ?Sized> Session<A> {
    /// Open a session on `slot_id` with the given session flags.
    pub fn open(api: Arc<A>, slot_id: CK_SLOT_ID, flags: CK_FLAGS) -> TResult<Self> {
        let mut handle: CK_SESSION_HANDLE = CK_INVALID_HANDLE;
        api.open_session(slot_id, flags, &mut handle)?;
        debug!("opened session {handle} on slot {slot_id}");
        Ok(Session {
            api,
            handle,
            closed: AtomicBool::new(false),
        })
    }

    /// Search the token for objects matching `template`.
    ///
    /// The search state on the session is always released once the
    /// search was initialized, even when draining the results failed;
    /// the drain error then takes precedence over a release error.
    pub fn find_objects(&self, template: &[Attribute]) -> TResult<Vec<CK_OBJECT_HANDLE>> {
        // raw attributes borrow the value buffers in `template`, which
        // outlive all three native calls below
        let mut raw: Vec<_> = template.iter().map(Attribute::as_raw).collect();
        self.api.find_objects_init(self.handle, &mut raw)?;
        let drained = self.drain_found_objects();
        let finalized = self.api.find_objects_final(self.handle);
        let handles = drained?;
        finalized?;
        Ok(handles)
    }

    /// One handle per call until the module reports none left.
    fn drain_found_objects(&self) -> TResult<Vec<CK_OBJECT_HANDLE>> {
        let mut handles = Vec::new();
        loop {
            let mut found: [CK_OBJECT_HANDLE; 1] = [CK_INVALID_HANDLE];
            let mut count: CK_ULONG = 0;
            self.api.find_objects(self.handle, &mut found, &mut count)?;
            if count == 0 {
                break;
            }
            trace!("found object {}", found[0]);
            handles.push(found[0]);
        }
        Ok(handles)
    }

    /// Set up a signing operation with a parameterless mechanism and
    /// the given key.
    pub fn sign_init(&self, mechanism: CK_MECHANISM_TYPE, key: CK_OBJECT_HANDLE) -> TResult<()> {
        self.api.sign_init(self.handle, mechanism, key)
    }

    /// Sign `data` with the operation set up by [`Session::sign_init`],
    /// reserving [`SIGNATURE_CAPACITY`] bytes for the output.
    pub fn sign(&self, data: &[u8]) -> TResult<Vec<u8>> {
        self.sign_with_capacity(data, SIGNATURE_CAPACITY)
    }

    /// Like [`Session::sign`] with an explicit output capacity. The
    /// result is truncated to the length the module reports; a buffer
    /// the module deems too small is a hard error, not retried.
    pub fn sign_with_capacity(&self, data: &[u8], capacity: usize) -> TResult<Vec<u8>> {
        let mut signature = vec![0_u8; capacity];
        let mut signature_len = CK_ULONG::try_from(capacity)?;
        self.api
            .sign(self.handle, data, &mut signature, &mut signature_len)?;
        signature.truncate(usize::try_from(signature_len)?);
        Ok(signature)
    }

    /// Close the session. Safe to call more than once; only the first
    /// call reaches the module.
    pub fn close(&self) -> TResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("closing session {}", self.handle);
        self.api.close_session(self.handle)
    }
}

impl<A: Pkcs11Api + ?Sized> Drop for Session<A> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
