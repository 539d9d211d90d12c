///! Patch form factors and light bouncing

use std::f64::consts::PI;

use glam::DVec3;
use itertools::Itertools;

use crate::threads::ThreadPool;

use super::{
    patches::{Patch, Transfer, TRANSFER_SCALE},
    trace::Tracer,
};

/// Turn raw form factors into fixed point transfers summing to exactly `TRANSFER_SCALE`.
/// Coefficients are floored, units left go to the largest fractional parts.
fn normalize_transfers(factors: &[(usize, f64)]) -> Vec<Transfer> {
    let total = factors.iter().map(|(_, factor)| *factor).sum::<f64>();

    if total <= 0.0 {
        return Vec::new();
    }

    let scaled = factors
        .iter()
        .map(|(_, factor)| factor / total * TRANSFER_SCALE as f64)
        .collect::<Vec<_>>();
    let mut coefficients = scaled.iter().map(|value| value.floor() as u32).collect::<Vec<_>>();

    let floored = coefficients.iter().map(|coefficient| *coefficient as u64).sum::<u64>();
    let remaining = (TRANSFER_SCALE as u64).saturating_sub(floored) as usize;

    let by_fraction = (0..scaled.len())
        .sorted_by(|a, b| (scaled[*b] - scaled[*b].floor()).total_cmp(&(scaled[*a] - scaled[*a].floor())))
        .collect::<Vec<_>>();
    for index in by_fraction.into_iter().cycle().take(remaining) {
        coefficients[index] += 1;
    }

    factors
        .iter()
        .zip(coefficients)
        // too small to matter
        .filter(|(_, coefficient)| *coefficient != 0)
        .map(|((patch, _), coefficient)| Transfer { patch: *patch, coefficient })
        .collect()
}

/// Light transfers from the patch to all the patches it sees
pub fn make_transfers(index: usize, patches: &[Patch], tracer: &Tracer) -> Vec<Transfer> {
    let patch = &patches[index];
    let mut factors = Vec::new();

    for (other_index, other) in patches.iter().enumerate() {
        if other_index == index {
            continue;
        }

        let delta = other.origin - patch.origin;
        let distance2 = delta.length_squared();
        let Some(direction) = delta.try_normalize() else {
            continue;
        };

        let cos1 = direction.dot(patch.normal);
        if cos1 <= 0.0 {
            continue;
        }

        let cos2 = -direction.dot(other.normal);
        if cos2 <= 0.0 {
            continue;
        }

        let factor = cos1 * cos2 * other.area / (PI * distance2);
        if factor <= 0.0 || tracer.test_line(patch.origin, other.origin) {
            continue;
        }

        factors.push((other_index, factor));
    }

    normalize_transfers(&factors)
}

/// Bounce sample light between patches, returns energy added by every bounce
pub fn bounce_light(patches: &mut [Patch], bounces: usize, pool: &ThreadPool) -> Vec<f64> {
    // incoming transfers of every receiver, in shooter order
    let mut incoming = vec![Vec::new(); patches.len()];
    for (shooter, patch) in patches.iter().enumerate() {
        for transfer in &patch.transfers {
            incoming[transfer.patch].push((shooter, transfer.coefficient));
        }
    }

    let mut radiosity = patches
        .iter()
        .map(|patch| patch.sample_light * patch.reflectivity * patch.area)
        .collect::<Vec<_>>();

    let mut energies = Vec::with_capacity(bounces);

    for bounce in 0..bounces {
        let illumination = pool.run_on_indices(patches.len(), |receiver| {
            incoming[receiver]
                .iter()
                .fold(DVec3::ZERO, |sum, (shooter, coefficient)| {
                    sum + radiosity[*shooter] * (*coefficient as f64 / TRANSFER_SCALE as f64)
                })
        });

        let mut added = 0.0;
        for ((patch, light), radiosity) in patches.iter_mut().zip(&illumination).zip(radiosity.iter_mut()) {
            patch.total_light += *light / patch.area;
            *radiosity = *light * patch.reflectivity;
            added += light.element_sum();
        }

        log::debug!("bounce {}: added {:.1}", bounce + 1, added);
        energies.push(added);
    }

    energies
}


// transfer.rs
