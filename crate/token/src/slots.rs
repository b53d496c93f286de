use tokensign_pkcs11_sys::{CK_SLOT_ID, CK_ULONG};
use tracing::debug;

use crate::{Pkcs11Api, TResult};

/// List the identifiers of the slots known to the module.
///
/// With `token_present` set, only slots that currently hold a token are
/// returned. The module is queried twice: once with no destination to
/// learn the count, then with a buffer of exactly that count. Zero
/// matching slots is an empty list, not an error.
pub fn list_slots<A: Pkcs11Api + ?Sized>(api: &A, token_present: bool) -> TResult<Vec<CK_SLOT_ID>> {
    let mut count: CK_ULONG = 0;
    api.get_slot_list(token_present, None, &mut count)?;

    let mut slot_list = vec![CK_SLOT_ID::default(); usize::try_from(count)?];
    if count > 0 {
        api.get_slot_list(token_present, Some(&mut slot_list), &mut count)?;
        // a token may vanish between the two calls
        slot_list.truncate(usize::try_from(count)?);
    }
    debug!("module reported {} slot(s)", slot_list.len());
    Ok(slot_list)
}
