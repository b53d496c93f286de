use tokensign_pkcs11_sys::{
    CK_ATTRIBUTE, CK_FLAGS, CK_INFO, CK_MECHANISM_TYPE, CK_OBJECT_HANDLE, CK_SESSION_HANDLE,
    CK_SLOT_ID, CK_ULONG,
};

use crate::TResult;

/// The operations the client dispatches through a module's function
/// table, one method per table entry, with the raw out-parameter
/// conventions of the C interface kept intact.
///
/// [`crate::Pkcs11Module`] implements this over a dynamically loaded
/// module; tests substitute a scripted implementation. Implementations
/// map an absent table entry to [`crate::TokenError::NotSupported`] and
/// a non-zero return value to [`crate::TokenError::Native`], so callers
/// only ever see `Ok` for a successful native call.
///
/// Buffers handed to these methods must not be reallocated or moved by
/// the caller while the call is outstanding; every method is blocking
/// and returns only once the module is done with them.
pub trait Pkcs11Api: Send + Sync {
    /// `C_GetSlotList`. With `slot_list: None` only the count is
    /// written; with a buffer, up to `count` identifiers are filled and
    /// `count` is updated to the number actually written.
    fn get_slot_list(
        &self,
        token_present: bool,
        slot_list: Option<&mut [CK_SLOT_ID]>,
        count: &mut CK_ULONG,
    ) -> TResult<()>;

    /// `C_GetInfo`.
    fn get_info(&self, info: &mut CK_INFO) -> TResult<()>;

    /// `C_OpenSession`. No application callback is registered.
    fn open_session(
        &self,
        slot_id: CK_SLOT_ID,
        flags: CK_FLAGS,
        session: &mut CK_SESSION_HANDLE,
    ) -> TResult<()>;

    /// `C_CloseSession`.
    fn close_session(&self, session: CK_SESSION_HANDLE) -> TResult<()>;

    /// `C_FindObjectsInit`. The attribute value buffers referenced by
    /// `template` must stay alive until `find_objects_final` returns.
    fn find_objects_init(
        &self,
        session: CK_SESSION_HANDLE,
        template: &mut [CK_ATTRIBUTE],
    ) -> TResult<()>;

    /// `C_FindObjects`. Fills at most `handles.len()` handles and
    /// writes the number found to `count`.
    fn find_objects(
        &self,
        session: CK_SESSION_HANDLE,
        handles: &mut [CK_OBJECT_HANDLE],
        count: &mut CK_ULONG,
    ) -> TResult<()>;

    /// `C_FindObjectsFinal`.
    fn find_objects_final(&self, session: CK_SESSION_HANDLE) -> TResult<()>;

    /// `C_SignInit` with a parameterless mechanism.
    fn sign_init(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: CK_MECHANISM_TYPE,
        key: CK_OBJECT_HANDLE,
    ) -> TResult<()>;

    /// `C_Sign`. Writes the signature into `signature` and the length
    /// actually produced into `signature_len`.
    fn sign(
        &self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
        signature: &mut [u8],
        signature_len: &mut CK_ULONG,
    ) -> TResult<()>;
}
