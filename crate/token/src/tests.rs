use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use tokensign_pkcs11_sys::*;

use crate::{
    Attribute, DEMO_PAYLOAD, Outcome, Pkcs11Api, Pkcs11Module, Session, SigningWorkflow, TResult,
    TokenError, list_slots,
    module::{EntryPoints, ModuleSource},
    rv_description,
};

fn log_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

const MOCK_SESSION: CK_SESSION_HANDLE = 1001;

/// A scripted module standing in for real hardware: fixed slot and
/// object lists, a canned signature, optional failure injection, and a
/// call counter per entry point.
#[derive(Default)]
struct MockApi {
    slots: Vec<CK_SLOT_ID>,
    objects: Vec<CK_OBJECT_HANDLE>,
    signature: Vec<u8>,
    find_error: Option<CK_RV>,
    sign_error: Option<CK_RV>,

    get_slot_list_calls: AtomicUsize,
    open_session_calls: AtomicUsize,
    close_session_calls: AtomicUsize,
    find_init_calls: AtomicUsize,
    find_calls: AtomicUsize,
    find_final_calls: AtomicUsize,
    sign_init_calls: AtomicUsize,
    sign_calls: AtomicUsize,

    find_cursor: AtomicUsize,
    last_template: Mutex<Vec<(CK_ATTRIBUTE_TYPE, Vec<u8>)>>,
    last_signed: Mutex<Vec<u8>>,
}

impl Pkcs11Api for MockApi {
    fn get_slot_list(
        &self,
        _token_present: bool,
        slot_list: Option<&mut [CK_SLOT_ID]>,
        count: &mut CK_ULONG,
    ) -> TResult<()> {
        self.get_slot_list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(buf) = slot_list {
            assert_eq!(
                buf.len(),
                self.slots.len(),
                "second call must pass a buffer of exactly the reported count"
            );
            buf.copy_from_slice(&self.slots);
        }
        *count = self.slots.len() as CK_ULONG;
        Ok(())
    }

    fn get_info(&self, info: &mut CK_INFO) -> TResult<()> {
        info.cryptokiVersion = CK_VERSION {
            major: 2,
            minor: 40,
        };
        let mut manufacturer = [b' '; 32];
        manufacturer[..4].copy_from_slice(b"Mock");
        info.manufacturerID = manufacturer;
        Ok(())
    }

    fn open_session(
        &self,
        _slot_id: CK_SLOT_ID,
        flags: CK_FLAGS,
        session: &mut CK_SESSION_HANDLE,
    ) -> TResult<()> {
        self.open_session_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(flags & CKF_SERIAL_SESSION, CKF_SERIAL_SESSION);
        *session = MOCK_SESSION;
        Ok(())
    }

    fn close_session(&self, session: CK_SESSION_HANDLE) -> TResult<()> {
        self.close_session_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session, MOCK_SESSION);
        Ok(())
    }

    fn find_objects_init(
        &self,
        session: CK_SESSION_HANDLE,
        template: &mut [CK_ATTRIBUTE],
    ) -> TResult<()> {
        self.find_init_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session, MOCK_SESSION);
        let mut captured = Vec::with_capacity(template.len());
        for attribute in template.iter() {
            let value = unsafe {
                std::slice::from_raw_parts(
                    attribute.pValue.cast::<u8>(),
                    usize::try_from(attribute.ulValueLen)?,
                )
            };
            captured.push((attribute.type_, value.to_vec()));
        }
        *self.last_template.lock().unwrap() = captured;
        self.find_cursor.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn find_objects(
        &self,
        session: CK_SESSION_HANDLE,
        handles: &mut [CK_OBJECT_HANDLE],
        count: &mut CK_ULONG,
    ) -> TResult<()> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session, MOCK_SESSION);
        if let Some(rv) = self.find_error {
            return Err(TokenError::native(rv));
        }
        assert!(!handles.is_empty());
        let next = self.find_cursor.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.objects.get(next) {
            handles[0] = *handle;
            *count = 1;
        } else {
            *count = 0;
        }
        Ok(())
    }

    fn find_objects_final(&self, session: CK_SESSION_HANDLE) -> TResult<()> {
        self.find_final_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session, MOCK_SESSION);
        Ok(())
    }

    fn sign_init(
        &self,
        session: CK_SESSION_HANDLE,
        mechanism: CK_MECHANISM_TYPE,
        key: CK_OBJECT_HANDLE,
    ) -> TResult<()> {
        self.sign_init_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session, MOCK_SESSION);
        assert_eq!(mechanism, CKM_SHA1_RSA_PKCS);
        assert_ne!(key, CK_INVALID_HANDLE);
        Ok(())
    }

    fn sign(
        &self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
        signature: &mut [u8],
        signature_len: &mut CK_ULONG,
    ) -> TResult<()> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(session, MOCK_SESSION);
        if let Some(rv) = self.sign_error {
            return Err(TokenError::native(rv));
        }
        *self.last_signed.lock().unwrap() = data.to_vec();
        assert!(
            signature.len() >= self.signature.len(),
            "output buffer smaller than the scripted signature"
        );
        assert_eq!(usize::try_from(*signature_len).unwrap(), signature.len());
        signature[..self.signature.len()].copy_from_slice(&self.signature);
        *signature_len = self.signature.len() as CK_ULONG;
        Ok(())
    }
}

// return-value catalog

#[test]
fn known_rv_describes_by_name() {
    assert_eq!(rv_description(CKR_OK), "CKR_OK");
    assert_eq!(rv_description(CKR_BUFFER_TOO_SMALL), "CKR_BUFFER_TOO_SMALL");
    assert_eq!(rv_description(CKR_FUNCTION_REJECTED), "CKR_FUNCTION_REJECTED");
}

#[test]
fn unknown_rv_describes_as_hex() {
    // 0x04 and 0x9999 are unassigned in v2.40
    assert_eq!(rv_description(0x0000_0004), "rv: 0x00000004");
    assert_eq!(rv_description(0x0000_9999), "rv: 0x00009999");
    assert_eq!(rv_description(CKR_VENDOR_DEFINED), "rv: 0x80000000");
}

// attribute encoding

#[test]
fn key_type_attribute_encodes_little_endian() {
    let attribute = Attribute::key_type(CKK_RSA);
    assert_eq!(attribute.attribute_type(), CKA_KEY_TYPE);
    assert_eq!(attribute.value(), vec![0_u8; size_of::<CK_ULONG>()]);
}

#[test]
fn object_class_attribute_encodes_little_endian() {
    let attribute = Attribute::object_class(CKO_PRIVATE_KEY);
    assert_eq!(attribute.attribute_type(), CKA_CLASS);
    assert_eq!(attribute.value(), CKO_PRIVATE_KEY.to_le_bytes());
}

// slot listing

#[test]
fn list_slots_with_no_token_is_empty() {
    let api = MockApi::default();
    let slots = list_slots(&api, true).unwrap();
    assert!(slots.is_empty());
    // the fill call is skipped when the count is zero
    assert_eq!(api.get_slot_list_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn list_slots_returns_identifiers_in_module_order() {
    let api = MockApi {
        slots: vec![3, 1, 7],
        ..Default::default()
    };
    let slots = list_slots(&api, true).unwrap();
    assert_eq!(slots, vec![3, 1, 7]);
    assert_eq!(api.get_slot_list_calls.load(Ordering::SeqCst), 2);
}

// sessions

fn open_mock_session(api: &Arc<MockApi>) -> Session<MockApi> {
    Session::open(api.clone(), 7, CKF_SERIAL_SESSION).unwrap()
}

#[test]
fn find_with_no_match_still_releases_the_search() {
    let api = Arc::new(MockApi::default());
    let session = open_mock_session(&api);
    let handles = session.find_objects(&[Attribute::object_class(CKO_CERTIFICATE)]).unwrap();
    assert!(handles.is_empty());
    assert_eq!(api.find_init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.find_final_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn find_drains_one_handle_per_call() {
    let api = Arc::new(MockApi {
        objects: vec![5],
        ..Default::default()
    });
    let session = open_mock_session(&api);
    let handles = session
        .find_objects(&[
            Attribute::object_class(CKO_PRIVATE_KEY),
            Attribute::key_type(CKK_RSA),
        ])
        .unwrap();
    assert_eq!(handles, vec![5]);
    // one call returning the handle, one returning the empty batch
    assert_eq!(api.find_calls.load(Ordering::SeqCst), 2);

    let template = api.last_template.lock().unwrap();
    assert_eq!(
        *template,
        vec![
            (CKA_CLASS, CKO_PRIVATE_KEY.to_le_bytes().to_vec()),
            (CKA_KEY_TYPE, CKK_RSA.to_le_bytes().to_vec()),
        ]
    );
}

#[test]
fn find_failure_still_releases_the_search() {
    let api = Arc::new(MockApi {
        find_error: Some(CKR_DEVICE_ERROR),
        ..Default::default()
    });
    let session = open_mock_session(&api);
    let result = session.find_objects(&[Attribute::key_type(CKK_RSA)]);
    assert!(matches!(
        result,
        Err(TokenError::Native {
            rv: CKR_DEVICE_ERROR,
            ..
        })
    ));
    assert_eq!(api.find_final_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn sign_truncates_to_the_reported_length() {
    let api = Arc::new(MockApi {
        signature: vec![0xab; 20],
        ..Default::default()
    });
    let session = open_mock_session(&api);
    session.sign_init(CKM_SHA1_RSA_PKCS, 42).unwrap();
    let signature = session.sign(b"data to sign").unwrap();
    assert_eq!(signature, vec![0xab; 20]);
}

#[test]
fn sign_capacity_can_be_overridden() {
    let api = Arc::new(MockApi {
        signature: vec![0x11; 200],
        ..Default::default()
    });
    let session = open_mock_session(&api);
    session.sign_init(CKM_SHA1_RSA_PKCS, 42).unwrap();
    let signature = session.sign_with_capacity(b"data", 256).unwrap();
    assert_eq!(signature.len(), 200);
}

#[test]
fn session_closes_exactly_once() {
    let api = Arc::new(MockApi::default());
    let session = open_mock_session(&api);
    session.close().unwrap();
    session.close().unwrap();
    drop(session);
    assert_eq!(api.close_session_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn dropped_session_is_closed() {
    let api = Arc::new(MockApi::default());
    let session = open_mock_session(&api);
    drop(session);
    assert_eq!(api.close_session_calls.load(Ordering::SeqCst), 1);
}

// module bootstrap

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct MissingSymbolSource {
    _drops: DropCounter,
}

impl ModuleSource for MissingSymbolSource {
    fn entry_points(&self) -> TResult<EntryPoints> {
        Err(TokenError::LoadFailed(
            "C_Initialize: symbol not found".to_owned(),
        ))
    }
}

unsafe extern "C" fn fake_initialize(_args: CK_VOID_PTR) -> CK_RV {
    CKR_OK
}

unsafe extern "C" fn failing_initialize(_args: CK_VOID_PTR) -> CK_RV {
    CKR_GENERAL_ERROR
}

static FINALIZE_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn fake_finalize(_reserved: CK_VOID_PTR) -> CK_RV {
    FINALIZE_CALLS.fetch_add(1, Ordering::SeqCst);
    CKR_OK
}

static FAKE_FUNCTIONS: CK_FUNCTION_LIST = CK_FUNCTION_LIST {
    version: CK_VERSION {
        major: 2,
        minor: 40,
    },
    C_Initialize: Some(fake_initialize),
    C_Finalize: Some(fake_finalize),
    C_GetInfo: None,
    C_GetFunctionList: None,
    C_GetSlotList: None,
    _reserved1: [None; 7],
    C_OpenSession: None,
    C_CloseSession: None,
    _reserved2: [None; 12],
    C_FindObjectsInit: None,
    C_FindObjects: None,
    C_FindObjectsFinal: None,
    _reserved3: [None; 13],
    C_SignInit: None,
    C_Sign: None,
    _reserved4: [None; 24],
};

unsafe extern "C" fn fake_get_function_list(list: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV {
    unsafe {
        *list = std::ptr::addr_of!(FAKE_FUNCTIONS).cast_mut();
    }
    CKR_OK
}

// same table without a finalize entry, so the finalize counter above
// stays owned by a single test
static BARE_FUNCTIONS: CK_FUNCTION_LIST = CK_FUNCTION_LIST {
    version: CK_VERSION {
        major: 2,
        minor: 40,
    },
    C_Initialize: Some(fake_initialize),
    C_Finalize: None,
    C_GetInfo: None,
    C_GetFunctionList: None,
    C_GetSlotList: None,
    _reserved1: [None; 7],
    C_OpenSession: None,
    C_CloseSession: None,
    _reserved2: [None; 12],
    C_FindObjectsInit: None,
    C_FindObjects: None,
    C_FindObjectsFinal: None,
    _reserved3: [None; 13],
    C_SignInit: None,
    C_Sign: None,
    _reserved4: [None; 24],
};

unsafe extern "C" fn bare_get_function_list(list: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV {
    unsafe {
        *list = std::ptr::addr_of!(BARE_FUNCTIONS).cast_mut();
    }
    CKR_OK
}

struct FailingInitSource {
    _drops: DropCounter,
}

impl ModuleSource for FailingInitSource {
    fn entry_points(&self) -> TResult<EntryPoints> {
        Ok(EntryPoints {
            initialize: failing_initialize,
            get_function_list: fake_get_function_list,
        })
    }
}

struct FakeModuleSource {
    _drops: DropCounter,
}

impl ModuleSource for FakeModuleSource {
    fn entry_points(&self) -> TResult<EntryPoints> {
        Ok(EntryPoints {
            initialize: fake_initialize,
            get_function_list: fake_get_function_list,
        })
    }
}

struct BareModuleSource;

impl ModuleSource for BareModuleSource {
    fn entry_points(&self) -> TResult<EntryPoints> {
        Ok(EntryPoints {
            initialize: fake_initialize,
            get_function_list: bare_get_function_list,
        })
    }
}

#[test]
fn bootstrap_missing_symbol_unloads_the_module() {
    let drops = Arc::new(AtomicUsize::new(0));
    let result = Pkcs11Module::from_source(Box::new(MissingSymbolSource {
        _drops: DropCounter(drops.clone()),
    }));
    assert!(matches!(result, Err(TokenError::LoadFailed(_))));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn bootstrap_initialize_failure_unloads_the_module() {
    let drops = Arc::new(AtomicUsize::new(0));
    let result = Pkcs11Module::from_source(Box::new(FailingInitSource {
        _drops: DropCounter(drops.clone()),
    }));
    assert!(matches!(
        result,
        Err(TokenError::Native {
            rv: CKR_GENERAL_ERROR,
            ..
        })
    ));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_finalizes_then_unloads() {
    let drops = Arc::new(AtomicUsize::new(0));
    let module = Pkcs11Module::from_source(Box::new(FakeModuleSource {
        _drops: DropCounter(drops.clone()),
    }))
    .unwrap();
    assert_eq!(FINALIZE_CALLS.load(Ordering::SeqCst), 0);
    drop(module);
    assert_eq!(FINALIZE_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn absent_table_entry_is_not_supported() {
    let module = Pkcs11Module::from_source(Box::new(BareModuleSource)).unwrap();
    let result = list_slots(&module, true);
    assert!(matches!(
        result,
        Err(TokenError::NotSupported("C_GetSlotList"))
    ));
}

// end-to-end workflow

#[test]
fn workflow_signs_with_the_first_key_of_the_first_slot() {
    log_init();
    let api = Arc::new(MockApi {
        slots: vec![7],
        objects: vec![42],
        signature: vec![0x5a; 128],
        ..Default::default()
    });
    let workflow = SigningWorkflow::new(api.clone());
    assert!(matches!(workflow.run(), Outcome::Success));

    assert_eq!(api.open_session_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.sign_init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.sign_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.last_signed.lock().unwrap().as_slice(), DEMO_PAYLOAD);
    // the session does not outlive the run
    assert_eq!(api.close_session_calls.load(Ordering::SeqCst), 1);

    let template = api.last_template.lock().unwrap();
    assert_eq!(
        *template,
        vec![
            (CKA_CLASS, CKO_PRIVATE_KEY.to_le_bytes().to_vec()),
            (CKA_KEY_TYPE, CKK_RSA.to_le_bytes().to_vec()),
        ]
    );
}

#[test]
fn workflow_without_a_token_reports_no_device() {
    log_init();
    let api = Arc::new(MockApi::default());
    let workflow = SigningWorkflow::new(api.clone());
    assert!(matches!(workflow.run(), Outcome::NoDevice));
    assert_eq!(api.open_session_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn workflow_without_a_key_reports_no_key() {
    log_init();
    let api = Arc::new(MockApi {
        slots: vec![7],
        ..Default::default()
    });
    let workflow = SigningWorkflow::new(api.clone());
    assert!(matches!(workflow.run(), Outcome::NoKey));
    assert_eq!(api.find_final_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.sign_init_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.close_session_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn workflow_surfaces_a_native_sign_failure() {
    log_init();
    let api = Arc::new(MockApi {
        slots: vec![7],
        objects: vec![42],
        sign_error: Some(CKR_FUNCTION_FAILED),
        ..Default::default()
    });
    let workflow = SigningWorkflow::new(api.clone());
    let outcome = workflow.run();
    match outcome {
        Outcome::Failed(TokenError::Native { rv, description }) => {
            assert_eq!(rv, CKR_FUNCTION_FAILED);
            assert_eq!(description, "CKR_FUNCTION_FAILED");
        }
        other => panic!("expected a native failure, got {other:?}"),
    }
    // the session is released on the error path too
    assert_eq!(api.close_session_calls.load(Ordering::SeqCst), 1);
}
