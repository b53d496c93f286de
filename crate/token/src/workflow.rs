use std::sync::{Arc, Mutex};

use tokensign_pkcs11_sys::{CKF_SERIAL_SESSION, CKK_RSA, CKM_SHA1_RSA_PKCS, CKO_PRIVATE_KEY};
use tracing::{debug, warn};

use crate::{
    Attribute, Pkcs11Api, Session, TResult, TokenError, session::SIGNATURE_CAPACITY,
    slots::list_slots,
};

/// Payload signed by the demo workflow.
pub const DEMO_PAYLOAD: &[u8] = b"tokensign demo payload";

/// Terminal result of one workflow run.
///
/// `NoDevice` and `NoKey` are legitimate empty-world outcomes, not
/// errors; `Failed` carries the structured error for diagnostics while
/// callers surface whatever coarse status text they want.
#[derive(Debug)]
pub enum Outcome {
    Success,
    NoDevice,
    NoKey,
    Failed(TokenError),
}

/// Drives a token through one signature: list the slots holding a
/// token, open a read-only session on the first one, locate an RSA
/// private key and sign [`DEMO_PAYLOAD`] with it.
///
/// Runs are serialized: concurrent calls to [`SigningWorkflow::run`]
/// on the same workflow queue up on an internal lock, so at most one
/// native operation is in flight per session. Every step is a blocking
/// call and nothing is retried; the first native failure ends the run.
pub struct SigningWorkflow<A: Pkcs11Api + ?Sized> {
    api: Arc<A>,
    run_lock: Mutex<()>,
    signature_capacity: usize,
}

impl<A: Pkcs11Api + ?Sized> SigningWorkflow<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self::with_signature_capacity(api, SIGNATURE_CAPACITY)
    }

    pub fn with_signature_capacity(api: Arc<A>, signature_capacity: usize) -> Self {
        SigningWorkflow {
            api,
            run_lock: Mutex::new(()),
            signature_capacity,
        }
    }

    /// Run the workflow once and report how far it got.
    pub fn run(&self) -> Outcome {
        let Ok(_guard) = self.run_lock.lock() else {
            return Outcome::Failed(TokenError::Default(
                "a previous workflow run panicked".to_owned(),
            ));
        };
        match self.execute() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("signing workflow failed: {e}");
                Outcome::Failed(e)
            }
        }
    }

    fn execute(&self) -> TResult<Outcome> {
        let slots = list_slots(self.api.as_ref(), true)?;
        let Some(slot_id) = slots.first() else {
            debug!("no token present");
            return Ok(Outcome::NoDevice);
        };

        let session = Session::open(self.api.clone(), *slot_id, CKF_SERIAL_SESSION)?;

        let template = [
            Attribute::object_class(CKO_PRIVATE_KEY),
            Attribute::key_type(CKK_RSA),
        ];
        let handles = session.find_objects(&template)?;
        let Some(key) = handles.first() else {
            debug!("no RSA private key on the token");
            return Ok(Outcome::NoKey);
        };

        session.sign_init(CKM_SHA1_RSA_PKCS, *key)?;
        let signature = session.sign_with_capacity(DEMO_PAYLOAD, self.signature_capacity)?;
        debug!("produced a {} byte signature", signature.len());

        session.close()?;
        Ok(Outcome::Success)
    }
}
