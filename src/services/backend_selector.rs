use crate::error::{AutomationError, AutomationResult};
use crate::models::BackendDescriptor;
use crate::platform::PlatformId;
use crate::resilience::CircuitState;
use tracing::{debug, warn};

/// Picks the backend a prompt attempt should go to.
///
/// Selection criteria (in order of priority):
/// 1. Breaker must not be open
/// 2. Specialization matching the platform's affinity preferred
/// 3. Closed breakers preferred over ones in their grace period
/// 4. Configuration order breaks remaining ties
///
/// Pure over its inputs; the caller supplies fresh descriptors per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendSelector;

impl BackendSelector {
    pub fn new() -> Self {
        Self
    }

    /// Eligible backends, best first
    pub fn rank(
        &self,
        platform: PlatformId,
        candidates: &[BackendDescriptor],
    ) -> Vec<BackendDescriptor> {
        let preferred = platform.preferred_specialization();
        let mut eligible: Vec<(usize, &BackendDescriptor)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, backend)| backend.circuit.status != CircuitState::Open)
            .collect();

        eligible.sort_by_key(|(position, backend)| {
            (
                backend.specialization != preferred,
                backend.circuit.status != CircuitState::Closed,
                *position,
            )
        });

        eligible
            .into_iter()
            .map(|(_, backend)| backend.clone())
            .collect()
    }

    pub fn select(
        &self,
        platform: PlatformId,
        candidates: &[BackendDescriptor],
    ) -> AutomationResult<BackendDescriptor> {
        match self.rank(platform, candidates).into_iter().next() {
            Some(selected) => {
                debug!(
                    platform = %platform,
                    backend = %selected.name,
                    circuit = %selected.circuit.status,
                    affinity = selected.specialization == platform.preferred_specialization(),
                    "Selected backend"
                );
                Ok(selected)
            }
            None => {
                warn!(
                    platform = %platform,
                    candidates = candidates.len(),
                    "🚨 No eligible automation backend"
                );
                Err(AutomationError::NoBackendAvailable { platform })
            }
        }
    }
}
