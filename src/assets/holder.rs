use std::rc::Rc;

/// Lifecycle hooks for anything that keeps native or cached resources alive.
///
/// Hosts call these from their pause, resume and destroy callbacks, usually
/// through the aggregating [`ResourceManager`].
pub trait ResourceHolder {
    /// Releases whatever is no longer referenced and returns how many entries
    /// are still held.
    fn reclaim_released_resources(&self) -> usize;

    /// Releases everything regardless of liveness.
    fn destroy_all_resources(&self);
}

/// Fans lifecycle calls out to every registered holder, in registration order.
#[derive(Default)]
pub struct ResourceManager {
    holders: Vec<Rc<dyn ResourceHolder>>,
}

impl ResourceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_holder(&mut self, holder: Rc<dyn ResourceHolder>) {
        self.holders.push(holder);
    }

    #[must_use]
    pub fn holder_count(&self) -> usize {
        self.holders.len()
    }
}

impl ResourceHolder for ResourceManager {
    fn reclaim_released_resources(&self) -> usize {
        self.holders
            .iter()
            .map(|h| h.reclaim_released_resources())
            .sum()
    }

    fn destroy_all_resources(&self) {
        for holder in &self.holders {
            holder.destroy_all_resources();
        }
    }
}
