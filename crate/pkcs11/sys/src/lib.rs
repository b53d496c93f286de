//! Copyright 2024 Cosmian Tech SAS
//!
//! Types, constants and function-pointer typedefs for the PKCS#11 v2.40
//! C interface, written by hand for the entry points the token client
//! dispatches through.
//!
//! Refs:
//!
//! - <https://docs.oasis-open.org/pkcs11/pkcs11-base/v2.40/pkcs11-base-v2.40.html>
//! - <https://docs.oasis-open.org/pkcs11/pkcs11-curr/v2.40/pkcs11-curr-v2.40.html>
//!
//! Section 2.1 "Structure packing" of the base spec requires 1-byte
//! packing on Windows only; PKCS#11 libraries on Linux and macOS use the
//! default layout, which is what these declarations assume.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

// Base types

pub type CK_BYTE = u8;
pub type CK_CHAR = CK_BYTE;
pub type CK_UTF8CHAR = CK_BYTE;
pub type CK_BBOOL = CK_BYTE;
pub type CK_ULONG = ::std::os::raw::c_ulong;
pub type CK_LONG = ::std::os::raw::c_long;
pub type CK_FLAGS = CK_ULONG;
pub type CK_RV = CK_ULONG;

pub type CK_SLOT_ID = CK_ULONG;
pub type CK_SESSION_HANDLE = CK_ULONG;
pub type CK_OBJECT_HANDLE = CK_ULONG;
pub type CK_OBJECT_CLASS = CK_ULONG;
pub type CK_KEY_TYPE = CK_ULONG;
pub type CK_ATTRIBUTE_TYPE = CK_ULONG;
pub type CK_MECHANISM_TYPE = CK_ULONG;
pub type CK_NOTIFICATION = CK_ULONG;
pub type CK_USER_TYPE = CK_ULONG;

pub type CK_VOID_PTR = *mut ::std::ffi::c_void;
pub type CK_BYTE_PTR = *mut CK_BYTE;
pub type CK_UTF8CHAR_PTR = *mut CK_UTF8CHAR;
pub type CK_ULONG_PTR = *mut CK_ULONG;
pub type CK_SLOT_ID_PTR = *mut CK_SLOT_ID;
pub type CK_SESSION_HANDLE_PTR = *mut CK_SESSION_HANDLE;
pub type CK_OBJECT_HANDLE_PTR = *mut CK_OBJECT_HANDLE;

pub const CK_TRUE: CK_BBOOL = 1;
pub const CK_FALSE: CK_BBOOL = 0;

pub const CK_INVALID_HANDLE: CK_ULONG = 0;
pub const CK_UNAVAILABLE_INFORMATION: CK_ULONG = !0;

// CK_VERSION

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CK_VERSION {
    pub major: CK_BYTE,
    pub minor: CK_BYTE,
}

// CK_INFO

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CK_INFO {
    pub cryptokiVersion: CK_VERSION,
    pub manufacturerID: [CK_UTF8CHAR; 32],
    pub flags: CK_FLAGS,
    pub libraryDescription: [CK_UTF8CHAR; 32],
    pub libraryVersion: CK_VERSION,
}

pub type CK_INFO_PTR = *mut CK_INFO;

impl Default for CK_INFO {
    fn default() -> Self {
        CK_INFO {
            cryptokiVersion: CK_VERSION::default(),
            manufacturerID: [0; 32],
            flags: 0,
            libraryDescription: [0; 32],
            libraryVersion: CK_VERSION::default(),
        }
    }
}

// CK_C_INITIALIZE_ARGS

#[repr(C)]
#[derive(Clone, Copy)]
pub struct CK_C_INITIALIZE_ARGS {
    pub CreateMutex: CK_CREATEMUTEX,
    pub DestroyMutex: CK_DESTROYMUTEX,
    pub LockMutex: CK_LOCKMUTEX,
    pub UnlockMutex: CK_UNLOCKMUTEX,
    pub flags: CK_FLAGS,
    pub pReserved: CK_VOID_PTR,
}

pub type CK_C_INITIALIZE_ARGS_PTR = *mut CK_C_INITIALIZE_ARGS;

// CK_ATTRIBUTE

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CK_ATTRIBUTE {
    pub type_: CK_ATTRIBUTE_TYPE,
    pub pValue: CK_VOID_PTR,
    pub ulValueLen: CK_ULONG,
}

pub type CK_ATTRIBUTE_PTR = *mut CK_ATTRIBUTE;

// CK_MECHANISM

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CK_MECHANISM {
    pub mechanism: CK_MECHANISM_TYPE,
    pub pParameter: CK_VOID_PTR,
    pub ulParameterLen: CK_ULONG,
}

pub type CK_MECHANISM_PTR = *mut CK_MECHANISM;

// Callback typedefs

pub type CK_CREATEMUTEX = Option<unsafe extern "C" fn(ppMutex: *mut CK_VOID_PTR) -> CK_RV>;
pub type CK_DESTROYMUTEX = Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;
pub type CK_LOCKMUTEX = Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;
pub type CK_UNLOCKMUTEX = Option<unsafe extern "C" fn(pMutex: CK_VOID_PTR) -> CK_RV>;

pub type CK_NOTIFY = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        event: CK_NOTIFICATION,
        pApplication: CK_VOID_PTR,
    ) -> CK_RV,
>;

// Function-pointer typedefs for the entry points the client dispatches
// through. Every one of them may be absent from a module's table.

pub type CK_C_Initialize = Option<unsafe extern "C" fn(pInitArgs: CK_VOID_PTR) -> CK_RV>;
pub type CK_C_Finalize = Option<unsafe extern "C" fn(pReserved: CK_VOID_PTR) -> CK_RV>;
pub type CK_C_GetInfo = Option<unsafe extern "C" fn(pInfo: CK_INFO_PTR) -> CK_RV>;
pub type CK_C_GetFunctionList =
    Option<unsafe extern "C" fn(ppFunctionList: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV>;
pub type CK_C_GetSlotList = Option<
    unsafe extern "C" fn(
        tokenPresent: CK_BBOOL,
        pSlotList: CK_SLOT_ID_PTR,
        pulCount: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_OpenSession = Option<
    unsafe extern "C" fn(
        slotID: CK_SLOT_ID,
        flags: CK_FLAGS,
        pApplication: CK_VOID_PTR,
        Notify: CK_NOTIFY,
        phSession: CK_SESSION_HANDLE_PTR,
    ) -> CK_RV,
>;
pub type CK_C_CloseSession = Option<unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV>;
pub type CK_C_FindObjectsInit = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
    ) -> CK_RV,
>;
pub type CK_C_FindObjects = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        phObject: CK_OBJECT_HANDLE_PTR,
        ulMaxObjectCount: CK_ULONG,
        pulObjectCount: CK_ULONG_PTR,
    ) -> CK_RV,
>;
pub type CK_C_FindObjectsFinal =
    Option<unsafe extern "C" fn(hSession: CK_SESSION_HANDLE) -> CK_RV>;
pub type CK_C_SignInit = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        hKey: CK_OBJECT_HANDLE,
    ) -> CK_RV,
>;
pub type CK_C_Sign = Option<
    unsafe extern "C" fn(
        hSession: CK_SESSION_HANDLE,
        pData: CK_BYTE_PTR,
        ulDataLen: CK_ULONG,
        pSignature: CK_BYTE_PTR,
        pulSignatureLen: CK_ULONG_PTR,
    ) -> CK_RV,
>;

// CK_FUNCTION_LIST
//
// The fixed v2.40 layout: a CK_VERSION followed by 68 function pointers.
// Entries this client never calls are kept as padding arrays so the
// named entries land at their correct offsets.

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct CK_FUNCTION_LIST {
    pub version: CK_VERSION,

    pub C_Initialize: CK_C_Initialize,
    pub C_Finalize: CK_C_Finalize,
    pub C_GetInfo: CK_C_GetInfo,
    pub C_GetFunctionList: CK_C_GetFunctionList,
    pub C_GetSlotList: CK_C_GetSlotList,

    /// C_GetSlotInfo through C_SetPIN
    pub _reserved1: [Option<unsafe extern "C" fn()>; 7],

    pub C_OpenSession: CK_C_OpenSession,
    pub C_CloseSession: CK_C_CloseSession,

    /// C_CloseAllSessions through C_SetAttributeValue
    pub _reserved2: [Option<unsafe extern "C" fn()>; 12],

    pub C_FindObjectsInit: CK_C_FindObjectsInit,
    pub C_FindObjects: CK_C_FindObjects,
    pub C_FindObjectsFinal: CK_C_FindObjectsFinal,

    /// C_EncryptInit through C_DigestFinal
    pub _reserved3: [Option<unsafe extern "C" fn()>; 13],

    pub C_SignInit: CK_C_SignInit,
    pub C_Sign: CK_C_Sign,

    /// C_SignUpdate through C_WaitForSlotEvent
    pub _reserved4: [Option<unsafe extern "C" fn()>; 24],
}

pub type CK_FUNCTION_LIST_PTR = *mut CK_FUNCTION_LIST;
pub type CK_FUNCTION_LIST_PTR_PTR = *mut CK_FUNCTION_LIST_PTR;

// Session flags

pub const CKF_RW_SESSION: CK_FLAGS = 0x0000_0002;
pub const CKF_SERIAL_SESSION: CK_FLAGS = 0x0000_0004;

// Initialization flags

pub const CKF_LIBRARY_CANT_CREATE_OS_THREADS: CK_FLAGS = 0x0000_0001;
pub const CKF_OS_LOCKING_OK: CK_FLAGS = 0x0000_0002;

// Slot info flags

pub const CKF_TOKEN_PRESENT: CK_FLAGS = 0x0000_0001;

// Attribute types

pub const CKA_CLASS: CK_ATTRIBUTE_TYPE = 0x0000_0000;
pub const CKA_TOKEN: CK_ATTRIBUTE_TYPE = 0x0000_0001;
pub const CKA_PRIVATE: CK_ATTRIBUTE_TYPE = 0x0000_0002;
pub const CKA_LABEL: CK_ATTRIBUTE_TYPE = 0x0000_0003;
pub const CKA_VALUE: CK_ATTRIBUTE_TYPE = 0x0000_0011;
pub const CKA_KEY_TYPE: CK_ATTRIBUTE_TYPE = 0x0000_0100;
pub const CKA_ID: CK_ATTRIBUTE_TYPE = 0x0000_0102;
pub const CKA_SIGN: CK_ATTRIBUTE_TYPE = 0x0000_0108;

// Object classes

pub const CKO_DATA: CK_OBJECT_CLASS = 0x0000_0000;
pub const CKO_CERTIFICATE: CK_OBJECT_CLASS = 0x0000_0001;
pub const CKO_PUBLIC_KEY: CK_OBJECT_CLASS = 0x0000_0002;
pub const CKO_PRIVATE_KEY: CK_OBJECT_CLASS = 0x0000_0003;
pub const CKO_SECRET_KEY: CK_OBJECT_CLASS = 0x0000_0004;

// Key types

pub const CKK_RSA: CK_KEY_TYPE = 0x0000_0000;
pub const CKK_DSA: CK_KEY_TYPE = 0x0000_0001;
pub const CKK_EC: CK_KEY_TYPE = 0x0000_0003;
pub const CKK_AES: CK_KEY_TYPE = 0x0000_001f;

// Mechanism types

pub const CKM_RSA_PKCS_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x0000_0000;
pub const CKM_RSA_PKCS: CK_MECHANISM_TYPE = 0x0000_0001;
pub const CKM_SHA1_RSA_PKCS: CK_MECHANISM_TYPE = 0x0000_0006;
pub const CKM_SHA256_RSA_PKCS: CK_MECHANISM_TYPE = 0x0000_0040;
pub const CKM_SHA_1: CK_MECHANISM_TYPE = 0x0000_0220;
pub const CKM_SHA256: CK_MECHANISM_TYPE = 0x0000_0250;

// Return values

pub const CKR_OK: CK_RV = 0x0000_0000;
pub const CKR_CANCEL: CK_RV = 0x0000_0001;
pub const CKR_HOST_MEMORY: CK_RV = 0x0000_0002;
pub const CKR_SLOT_ID_INVALID: CK_RV = 0x0000_0003;
pub const CKR_GENERAL_ERROR: CK_RV = 0x0000_0005;
pub const CKR_FUNCTION_FAILED: CK_RV = 0x0000_0006;
pub const CKR_ARGUMENTS_BAD: CK_RV = 0x0000_0007;
pub const CKR_NO_EVENT: CK_RV = 0x0000_0008;
pub const CKR_NEED_TO_CREATE_THREADS: CK_RV = 0x0000_0009;
pub const CKR_CANT_LOCK: CK_RV = 0x0000_000a;
pub const CKR_ATTRIBUTE_READ_ONLY: CK_RV = 0x0000_0010;
pub const CKR_ATTRIBUTE_SENSITIVE: CK_RV = 0x0000_0011;
pub const CKR_ATTRIBUTE_TYPE_INVALID: CK_RV = 0x0000_0012;
pub const CKR_ATTRIBUTE_VALUE_INVALID: CK_RV = 0x0000_0013;
pub const CKR_ACTION_PROHIBITED: CK_RV = 0x0000_001b;
pub const CKR_DATA_INVALID: CK_RV = 0x0000_0020;
pub const CKR_DATA_LEN_RANGE: CK_RV = 0x0000_0021;
pub const CKR_DEVICE_ERROR: CK_RV = 0x0000_0030;
pub const CKR_DEVICE_MEMORY: CK_RV = 0x0000_0031;
pub const CKR_DEVICE_REMOVED: CK_RV = 0x0000_0032;
pub const CKR_ENCRYPTED_DATA_INVALID: CK_RV = 0x0000_0040;
pub const CKR_ENCRYPTED_DATA_LEN_RANGE: CK_RV = 0x0000_0041;
pub const CKR_FUNCTION_CANCELED: CK_RV = 0x0000_0050;
pub const CKR_FUNCTION_NOT_PARALLEL: CK_RV = 0x0000_0051;
pub const CKR_FUNCTION_NOT_SUPPORTED: CK_RV = 0x0000_0054;
pub const CKR_KEY_HANDLE_INVALID: CK_RV = 0x0000_0060;
pub const CKR_KEY_SIZE_RANGE: CK_RV = 0x0000_0062;
pub const CKR_KEY_TYPE_INCONSISTENT: CK_RV = 0x0000_0063;
pub const CKR_KEY_NOT_NEEDED: CK_RV = 0x0000_0064;
pub const CKR_KEY_CHANGED: CK_RV = 0x0000_0065;
pub const CKR_KEY_NEEDED: CK_RV = 0x0000_0066;
pub const CKR_KEY_INDIGESTIBLE: CK_RV = 0x0000_0067;
pub const CKR_KEY_FUNCTION_NOT_PERMITTED: CK_RV = 0x0000_0068;
pub const CKR_KEY_NOT_WRAPPABLE: CK_RV = 0x0000_0069;
pub const CKR_KEY_UNEXTRACTABLE: CK_RV = 0x0000_006a;
pub const CKR_MECHANISM_INVALID: CK_RV = 0x0000_0070;
pub const CKR_MECHANISM_PARAM_INVALID: CK_RV = 0x0000_0071;
pub const CKR_OBJECT_HANDLE_INVALID: CK_RV = 0x0000_0082;
pub const CKR_OPERATION_ACTIVE: CK_RV = 0x0000_0090;
pub const CKR_OPERATION_NOT_INITIALIZED: CK_RV = 0x0000_0091;
pub const CKR_PIN_INCORRECT: CK_RV = 0x0000_00a0;
pub const CKR_PIN_INVALID: CK_RV = 0x0000_00a1;
pub const CKR_PIN_LEN_RANGE: CK_RV = 0x0000_00a2;
pub const CKR_PIN_EXPIRED: CK_RV = 0x0000_00a3;
pub const CKR_PIN_LOCKED: CK_RV = 0x0000_00a4;
pub const CKR_SESSION_CLOSED: CK_RV = 0x0000_00b0;
pub const CKR_SESSION_COUNT: CK_RV = 0x0000_00b1;
pub const CKR_SESSION_HANDLE_INVALID: CK_RV = 0x0000_00b3;
pub const CKR_SESSION_PARALLEL_NOT_SUPPORTED: CK_RV = 0x0000_00b4;
pub const CKR_SESSION_READ_ONLY: CK_RV = 0x0000_00b5;
pub const CKR_SESSION_EXISTS: CK_RV = 0x0000_00b6;
pub const CKR_SESSION_READ_ONLY_EXISTS: CK_RV = 0x0000_00b7;
pub const CKR_SESSION_READ_WRITE_SO_EXISTS: CK_RV = 0x0000_00b8;
pub const CKR_SIGNATURE_INVALID: CK_RV = 0x0000_00c0;
pub const CKR_SIGNATURE_LEN_RANGE: CK_RV = 0x0000_00c1;
pub const CKR_TEMPLATE_INCOMPLETE: CK_RV = 0x0000_00d0;
pub const CKR_TEMPLATE_INCONSISTENT: CK_RV = 0x0000_00d1;
pub const CKR_TOKEN_NOT_PRESENT: CK_RV = 0x0000_00e0;
pub const CKR_TOKEN_NOT_RECOGNIZED: CK_RV = 0x0000_00e1;
pub const CKR_TOKEN_WRITE_PROTECTED: CK_RV = 0x0000_00e2;
pub const CKR_UNWRAPPING_KEY_HANDLE_INVALID: CK_RV = 0x0000_00f0;
pub const CKR_UNWRAPPING_KEY_SIZE_RANGE: CK_RV = 0x0000_00f1;
pub const CKR_UNWRAPPING_KEY_TYPE_INCONSISTENT: CK_RV = 0x0000_00f2;
pub const CKR_USER_ALREADY_LOGGED_IN: CK_RV = 0x0000_0100;
pub const CKR_USER_NOT_LOGGED_IN: CK_RV = 0x0000_0101;
pub const CKR_USER_PIN_NOT_INITIALIZED: CK_RV = 0x0000_0102;
pub const CKR_USER_TYPE_INVALID: CK_RV = 0x0000_0103;
pub const CKR_USER_ANOTHER_ALREADY_LOGGED_IN: CK_RV = 0x0000_0104;
pub const CKR_USER_TOO_MANY_TYPES: CK_RV = 0x0000_0105;
pub const CKR_WRAPPED_KEY_INVALID: CK_RV = 0x0000_0110;
pub const CKR_WRAPPED_KEY_LEN_RANGE: CK_RV = 0x0000_0112;
pub const CKR_WRAPPING_KEY_HANDLE_INVALID: CK_RV = 0x0000_0113;
pub const CKR_WRAPPING_KEY_SIZE_RANGE: CK_RV = 0x0000_0114;
pub const CKR_WRAPPING_KEY_TYPE_INCONSISTENT: CK_RV = 0x0000_0115;
pub const CKR_RANDOM_SEED_NOT_SUPPORTED: CK_RV = 0x0000_0120;
pub const CKR_RANDOM_NO_RNG: CK_RV = 0x0000_0121;
pub const CKR_DOMAIN_PARAMS_INVALID: CK_RV = 0x0000_0130;
pub const CKR_CURVE_NOT_SUPPORTED: CK_RV = 0x0000_0140;
pub const CKR_BUFFER_TOO_SMALL: CK_RV = 0x0000_0150;
pub const CKR_SAVED_STATE_INVALID: CK_RV = 0x0000_0160;
pub const CKR_INFORMATION_SENSITIVE: CK_RV = 0x0000_0170;
pub const CKR_STATE_UNSAVEABLE: CK_RV = 0x0000_0180;
pub const CKR_CRYPTOKI_NOT_INITIALIZED: CK_RV = 0x0000_0190;
pub const CKR_CRYPTOKI_ALREADY_INITIALIZED: CK_RV = 0x0000_0191;
pub const CKR_MUTEX_BAD: CK_RV = 0x0000_01a0;
pub const CKR_MUTEX_NOT_LOCKED: CK_RV = 0x0000_01a1;
pub const CKR_NEW_PIN_MODE: CK_RV = 0x0000_01b0;
pub const CKR_NEXT_OTP: CK_RV = 0x0000_01b1;
pub const CKR_EXCEEDED_MAX_ITERATIONS: CK_RV = 0x0000_01b5;
pub const CKR_FIPS_SELF_TEST_FAILED: CK_RV = 0x0000_01b6;
pub const CKR_LIBRARY_LOAD_FAILED: CK_RV = 0x0000_01b7;
pub const CKR_PIN_TOO_WEAK: CK_RV = 0x0000_01b8;
pub const CKR_PUBLIC_KEY_INVALID: CK_RV = 0x0000_01b9;
pub const CKR_FUNCTION_REJECTED: CK_RV = 0x0000_0200;
pub const CKR_VENDOR_DEFINED: CK_RV = 0x8000_0000;

#[cfg(test)]
mod tests {
    #[test]
    fn function_list_layout() {
        // a CK_VERSION padded to pointer alignment + 68 function pointers
        assert_eq!(
            std::mem::size_of::<super::CK_FUNCTION_LIST>(),
            std::mem::size_of::<usize>() + 68 * std::mem::size_of::<usize>(),
        );
    }

    #[test]
    fn attribute_layout() {
        assert_eq!(
            std::mem::size_of::<super::CK_ATTRIBUTE>(),
            3 * std::mem::size_of::<usize>(),
        );
    }
}
