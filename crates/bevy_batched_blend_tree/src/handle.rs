use bevy::reflect::{Reflect, std_traits::ReflectDefault};

/// Opaque, stable reference to a live instance.
///
/// Stores the pool id plus one so that the zeroed default value is never a valid handle.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[reflect(Default)]
pub struct InstanceHandle {
    index: usize,
}

impl InstanceHandle {
    pub const INVALID: InstanceHandle = InstanceHandle { index: 0 };

    pub(crate) fn from_id(id: usize) -> Self {
        Self { index: id + 1 }
    }

    /// Pool id this handle wraps, `None` for the invalid handle.
    pub fn id(&self) -> Option<usize> {
        self.index.checked_sub(1)
    }

    pub fn is_valid(&self) -> bool {
        self.index != 0
    }
}
