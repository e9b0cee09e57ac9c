use bevy::{
    app::{App, Plugin},
    asset::AssetApp,
};

use crate::{
    handle::InstanceHandle,
    node_graph::{Node, NodeType},
    settings::{Execution, PropagationMode, SimulateSettings, TimeWrap},
    tree::loader::{BlendTreeAsset, BlendTreeLoader},
};

/// Registers the `*.blendtree.ron` asset and the reflected blend tree types.
///
/// Requires bevy's `AssetPlugin`.
pub struct BatchedBlendTreePlugin;

impl Plugin for BatchedBlendTreePlugin {
    fn build(&self, app: &mut App) {
        self.register_assets(app);
        self.register_types(app);
    }
}

impl BatchedBlendTreePlugin {
    fn register_assets(&self, app: &mut App) {
        app.init_asset::<BlendTreeAsset>()
            .init_asset_loader::<BlendTreeLoader>();
    }

    fn register_types(&self, app: &mut App) {
        app //
            .register_type::<NodeType>()
            .register_type::<Node>()
            .register_type::<InstanceHandle>()
            .register_type::<SimulateSettings>()
            .register_type::<Execution>()
            .register_type::<PropagationMode>()
            .register_type::<TimeWrap>();
    }
}
