use std::{
    fmt,
    fmt::{Display, Formatter},
    ptr,
};

use libloading::Library;
use tokensign_pkcs11_sys::*;
use tracing::debug;

use crate::{Pkcs11Api, TResult, TokenError};

pub(crate) type InitializeFn = unsafe extern "C" fn(pInitArgs: CK_VOID_PTR) -> CK_RV;
pub(crate) type GetFunctionListFn =
    unsafe extern "C" fn(ppFunctionList: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV;

/// The two entry points a module must export directly; everything else
/// is reached through the function table they hand out.
pub(crate) struct EntryPoints {
    pub initialize: InitializeFn,
    pub get_function_list: GetFunctionListFn,
}

/// Provider of the required entry points, owning whatever keeps them
/// callable. Dropping the source releases the underlying module, so a
/// source must never be dropped while calls through its entry points or
/// function table can still happen.
pub(crate) trait ModuleSource: Send + Sync {
    fn entry_points(&self) -> TResult<EntryPoints>;
}

struct DynamicLibrary {
    library: Library,
}

impl ModuleSource for DynamicLibrary {
    fn entry_points(&self) -> TResult<EntryPoints> {
        let initialize = unsafe {
            *self
                .library
                .get::<InitializeFn>(b"C_Initialize")
                .map_err(|e| TokenError::LoadFailed(format!("C_Initialize: {e}")))?
        };
        let get_function_list = unsafe {
            *self
                .library
                .get::<GetFunctionListFn>(b"C_GetFunctionList")
                .map_err(|e| TokenError::LoadFailed(format!("C_GetFunctionList: {e}")))?
        };
        Ok(EntryPoints {
            initialize,
            get_function_list,
        })
    }
}

/// A loaded and initialized PKCS#11 module.
///
/// Construction runs the full bootstrap: load the dynamic library,
/// resolve `C_Initialize` and `C_GetFunctionList`, initialize the
/// module without locking callbacks, then copy its function table. The
/// table is immutable for the lifetime of the binding. Any bootstrap
/// failure unloads the library before returning.
///
/// Dropping the binding finalizes the module (best effort) and then
/// unloads the library, in that order, exactly once. The binding is not
/// clonable; share it behind an `Arc`.
pub struct Pkcs11Module {
    functions: CK_FUNCTION_LIST,
    _source: Box<dyn ModuleSource>,
}

impl Pkcs11Module {
    /// Load and initialize the module at `path`.
    pub fn open<P>(path: P) -> TResult<Self>
    where
        P: AsRef<std::ffi::OsStr>,
    {
        let library = unsafe { Library::new(path.as_ref()) }?;
        debug!("loaded PKCS#11 module {:?}", path.as_ref());
        Self::from_source(Box::new(DynamicLibrary { library }))
    }

    pub(crate) fn from_source(source: Box<dyn ModuleSource>) -> TResult<Self> {
        let entry_points = source.entry_points()?;

        let init_args = CK_C_INITIALIZE_ARGS {
            CreateMutex: None,
            DestroyMutex: None,
            LockMutex: None,
            UnlockMutex: None,
            flags: 0,
            pReserved: ptr::null_mut(),
        };
        let rv = unsafe {
            (entry_points.initialize)(
                ptr::from_ref(&init_args)
                    .cast::<std::ffi::c_void>()
                    .cast_mut(),
            )
        };
        if rv != CKR_OK {
            return Err(TokenError::native(rv));
        }

        let mut list: CK_FUNCTION_LIST_PTR = ptr::null_mut();
        let rv = unsafe { (entry_points.get_function_list)(&raw mut list) };
        if rv != CKR_OK {
            return Err(TokenError::native(rv));
        }
        if list.is_null() {
            return Err(TokenError::LoadFailed(
                "C_GetFunctionList returned a null function list".to_owned(),
            ));
        }
        // copy the table out of module-owned memory
        let functions = unsafe { *list };

        Ok(Pkcs11Module {
            functions,
            _source: source,
        })
    }
}

impl Drop for Pkcs11Module {
    fn drop(&mut self) {
        // finalize before `_source` drops and unloads the library
        if let Some(finalize) = self.functions.C_Finalize {
            let _rv = unsafe { finalize(ptr::null_mut()) };
        }
    }
}

fn check(rv: CK_RV) -> TResult<()> {
    if rv == CKR_OK {
        Ok(())
    } else {
        Err(TokenError::native(rv))
    }
}

impl Pkcs11Api for Pkcs11Module {
    fn get_slot_list(
        &self,
        token_present: bool,
        slot_list: Option<&mut [CK_SLOT_ID]>,
        count: &mut CK_ULONG,
    ) -> TResult<()> {
        let f = self
            .functions
            .C_GetSlotList
            .ok_or(TokenError::NotSupported("C_GetSlotList"))?;
        let token_present = if token_present { CK_TRUE } else { CK_FALSE };
        let slot_list_ptr = match slot_list {
            Some(slots) => slots.as_mut_ptr(),
            None => ptr::null_mut(),
        };
        check(unsafe { f(token_present, slot_list_ptr, ptr::from_mut(count)) })
    }

    fn get_info(&self, info: &mut CK_INFO) -> TResult<()> {
        let f = self
            .functions
            .C_GetInfo
            .ok_or(TokenError::NotSupported("C_GetInfo"))?;
        check(unsafe { f(ptr::from_mut(info)) })
    }

    fn open_session(
        &self,
        slot_id: CK_SLOT_ID,
        flags: CK_FLAGS,
        session: &mut CK_SESSION_HANDLE,
    ) -> TResult<()> {
        let f = self
            .functions
            .C_OpenSession
            .ok_or(TokenError::NotSupported("C_OpenSession"))?;
        check(unsafe { f(slot_id, flags, ptr::null_mut(), None, ptr::from_mut(session)) })
    }

    fn close_session(&self, session: CK_SESSION_HANDLE) -> TResult<()> {
        let f = self
            .functions
            .C_CloseSession
            .ok_or(TokenError::NotSupported("C_CloseSession"))?;
        check(unsafe { f(session) })
    }

    fn find_objects_init(
        &self,
        session: CK_SESSION_HANDLE,
        template: &mut [CK_ATTRIBUTE],
    ) -> TResult<()> {
        let f = self
            .functions
            .C_FindObjectsInit
            .ok_or(TokenError::NotSupported("C_FindObjectsInit"))?;
        check(unsafe {
            f(
                session,
                template.as_mut_ptr(),
                CK_ULONG::try_from(template.len())?,
            )
        })
    }

    fn find_objects(
        &self,
        session: CK_SESSION_HANDLE,
        handles: &mut [CK_OBJECT_HANDLE],
        count: &mut CK_ULONG,
    ) -> TResult<()> {
        let f = self
            .functions
            .C_FindObjects
            .ok_or(TokenError::NotSupported("C_FindObjects"))?;
        check(unsafe {
            f(
                session,
                handles.as_mut_ptr(),
                CK_ULONG::try_from(handles.len())?,
                ptr::from_mut(count),
            )
        })
    }

    fn find_objects_final(&self, session: CK_SESSION_HANDLE) -> TResult<()> {
        let f = self
            .functions
            .C_FindObjectsFinal
            .ok_or(TokenError::NotSupported("C_FindObjectsFinal"))?;
        check(unsafe { f(session) })
    }

    fn sign_init(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: CK_MECHANISM_TYPE,
        key: CK_OBJECT_HANDLE,
    ) -> TResult<()> {
        let f = self
            .functions
            .C_SignInit
            .ok_or(TokenError::NotSupported("C_SignInit"))?;
        let mut mechanism = CK_MECHANISM {
            mechanism,
            pParameter: ptr::null_mut(),
            ulParameterLen: 0,
        };
        check(unsafe { f(session, &raw mut mechanism, key) })
    }

    fn sign(
        &self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
        signature: &mut [u8],
        signature_len: &mut CK_ULONG,
    ) -> TResult<()> {
        let f = self
            .functions
            .C_Sign
            .ok_or(TokenError::NotSupported("C_Sign"))?;
        // the interface wants a mutable data pointer; sign from a copy
        // rather than aliasing the caller's buffer
        let mut data = data.to_vec();
        check(unsafe {
            f(
                session,
                data.as_mut_ptr(),
                CK_ULONG::try_from(data.len())?,
                signature.as_mut_ptr(),
                ptr::from_mut(signature_len),
            )
        })
    }
}

/// General information reported by a module via `C_GetInfo`.
pub struct ModuleInfo {
    pub cryptoki_version: (u8, u8),
    pub manufacturer_id: String,
    pub library_description: String,
    pub library_version: (u8, u8),
}

impl ModuleInfo {
    pub fn query<A: Pkcs11Api + ?Sized>(api: &A) -> TResult<Self> {
        let mut info = CK_INFO::default();
        api.get_info(&mut info)?;
        Ok(info.into())
    }
}

impl From<CK_INFO> for ModuleInfo {
    fn from(info: CK_INFO) -> Self {
        ModuleInfo {
            cryptoki_version: (info.cryptokiVersion.major, info.cryptokiVersion.minor),
            manufacturer_id: String::from_utf8_lossy(&info.manufacturerID)
                .trim_end_matches([' ', '\0'])
                .to_string(),
            library_description: String::from_utf8_lossy(&info.libraryDescription)
                .trim_end_matches([' ', '\0'])
                .to_string(),
            library_version: (info.libraryVersion.major, info.libraryVersion.minor),
        }
    }
}

impl Display for ModuleInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{} ({}, Cryptoki {}.{})",
            self.library_description,
            self.library_version.0,
            self.library_version.1,
            self.manufacturer_id,
            self.cryptoki_version.0,
            self.cryptoki_version.1
        )
    }
}
