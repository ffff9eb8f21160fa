use std::collections::{BTreeMap, BTreeSet};

use rand_chacha::ChaCha8Rng;
use rand_core::{CryptoRngCore, SeedableRng};
use rayon::prelude::*;

use crate::entities::PartyId;

/// Runs `f` for every party in `ids` on the `rayon` thread pool.
///
/// Each invocation gets its own RNG seeded from `rng` beforehand, in the order of `ids`,
/// so the results do not depend on the scheduling.
/// Results are merged into a map after all the tasks have joined.
pub(crate) fn par_map_parties<T, E, F>(
    rng: &mut impl CryptoRngCore,
    ids: &BTreeSet<PartyId>,
    f: F,
) -> Result<BTreeMap<PartyId, T>, E>
where
    T: Send,
    E: Send,
    F: Fn(&mut ChaCha8Rng, &PartyId) -> Result<T, E> + Sync,
{
    let tasks = ids
        .iter()
        .map(|id| {
            let mut seed = <ChaCha8Rng as SeedableRng>::Seed::default();
            rng.fill_bytes(&mut seed);
            (*id, seed)
        })
        .collect::<Vec<_>>();

    let results = tasks
        .into_par_iter()
        .map(|(id, seed)| {
            let mut task_rng = ChaCha8Rng::from_seed(seed);
            f(&mut task_rng, &id).map(|value| (id, value))
        })
        .collect::<Result<Vec<_>, E>>()?;

    Ok(results.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand_chacha::ChaCha8Rng;
    use rand_core::{RngCore, SeedableRng};

    use super::par_map_parties;
    use crate::entities::PartyId;

    #[test]
    fn results_do_not_depend_on_scheduling() {
        let ids = (0..8).map(PartyId::new).collect::<BTreeSet<_>>();
        let run = || {
            let mut rng = ChaCha8Rng::seed_from_u64(123);
            par_map_parties(&mut rng, &ids, |rng, id| Ok::<_, ()>((id.as_u32(), rng.next_u64()))).unwrap()
        };
        let first = run();
        assert_eq!(first, run());
        assert_eq!(first.keys().cloned().collect::<BTreeSet<_>>(), ids);
    }

    #[test]
    fn first_error_is_propagated() {
        let ids = (0..4).map(PartyId::new).collect::<BTreeSet<_>>();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = par_map_parties(&mut rng, &ids, |_rng, id| {
            if id.as_u32() == 2 {
                Err("failed")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("failed"));
    }
}
