mod generic;

#[cfg(test)]
pub(crate) mod test_utils;

pub(crate) use generic::{
    finalize_round, no_parties, verify_round_message, DynPayload, FinalizeError, Outgoing, ReceiveError, Round,
};
