use bevy::{
    asset::{Asset, AssetLoader, LoadContext, io::Reader},
    log::debug,
    reflect::TypePath,
};
use ron::ser::PrettyConfig;

use super::TreeNode;
use crate::{errors::TreeLoaderError, node_graph::NodeGraph};

/// A loaded `*.blendtree.ron` file: the authored tree and its flattened graph.
#[derive(Asset, TypePath, Clone, Debug, PartialEq)]
pub struct BlendTreeAsset {
    pub root: TreeNode,
    pub graph: NodeGraph,
}

impl BlendTreeAsset {
    pub fn from_tree(root: TreeNode) -> Result<Self, TreeLoaderError> {
        let graph = NodeGraph::from_tree(&root)?;
        Ok(Self { root, graph })
    }
}

/// Reads and writes `*.blendtree.ron` files.
///
/// A file holds a single [`TreeNode`], the root of the tree:
/// ```ron
/// StateBlend((
///     name: "locomotion",
///     states: [
///         Clip((name: "idle", clip: "clips/idle", length: 2.0)),
///         Clip((name: "walk", clip: "clips/walk", length: 1.2)),
///     ],
/// ))
/// ```
#[derive(Default, TypePath)]
pub struct BlendTreeLoader;

impl BlendTreeLoader {
    pub const EXTENSIONS: &'static [&'static str] = &["blendtree.ron"];

    pub fn from_bytes(bytes: &[u8]) -> Result<TreeNode, TreeLoaderError> {
        Ok(ron::de::from_bytes(bytes)?)
    }

    pub fn parse(source: &str) -> Result<TreeNode, TreeLoaderError> {
        Self::from_bytes(source.as_bytes())
    }

    /// Parses and flattens in one go, so validation failures surface as loader errors.
    pub fn asset_from_bytes(bytes: &[u8]) -> Result<BlendTreeAsset, TreeLoaderError> {
        BlendTreeAsset::from_tree(Self::from_bytes(bytes)?)
    }

    pub fn to_string(root: &TreeNode) -> Result<String, TreeLoaderError> {
        Ok(ron::ser::to_string_pretty(root, PrettyConfig::default())?)
    }
}

impl AssetLoader for BlendTreeLoader {
    type Asset = BlendTreeAsset;
    type Settings = ();
    type Error = TreeLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        debug!("Loading blend tree {}", load_context.path());
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).await?;
        Self::asset_from_bytes(&bytes)
    }

    fn extensions(&self) -> &[&str] {
        Self::EXTENSIONS
    }
}

#[cfg(test)]
mod test {
    use bevy::math::Vec2;

    use super::*;
    use crate::errors::TreeValidationError;

    const LOCOMOTION: &str = r#"
        StateBlend((
            name: "root",
            states: [
                Clip((name: "idle", clip: "clips/idle", length: 2.0)),
                Blend1D((
                    name: "move",
                    children: [
                        (node: Clip((name: "walk", clip: "clips/walk", length: 1.0)), position: 0.0),
                        (node: Clip((name: "run", clip: "clips/run", length: 0.5)), position: 1.0),
                    ],
                )),
            ],
        ))
    "#;

    #[test]
    fn test_parse_handwritten_tree() {
        let root = BlendTreeLoader::parse(LOCOMOTION).unwrap();

        assert_eq!(root.name(), "root");
        let children = root.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], &TreeNode::clip("idle", "clips/idle", 2.0));
        assert_eq!(children[1].children().len(), 2);
    }

    #[test]
    fn test_unknown_node_type_rejects_tree() {
        let source = r#"StateBlend((name: "root", states: [Additive((name: "x"))]))"#;

        assert!(matches!(
            BlendTreeLoader::parse(source),
            Err(TreeLoaderError::RonSpannedError(_))
        ));
    }

    #[test]
    fn test_serialized_tree_parses_back() {
        let root = TreeNode::blend_2d(
            "strafe",
            [
                (Vec2::new(0., 1.), TreeNode::clip("fwd", "clips/fwd", 1.)),
                (Vec2::new(-1., 0.), TreeNode::clip("left", "clips/left", 1.)),
                (Vec2::new(1., 0.), TreeNode::clip("right", "clips/right", 1.)),
            ],
        );

        let serialized = BlendTreeLoader::to_string(&root).unwrap();
        let parsed = BlendTreeLoader::parse(&serialized).unwrap();

        assert_eq!(parsed, root);
    }

    #[test]
    fn test_asset_keeps_tree_and_graph() {
        let asset = BlendTreeLoader::asset_from_bytes(LOCOMOTION.as_bytes()).unwrap();

        assert_eq!(asset.root, BlendTreeLoader::parse(LOCOMOTION).unwrap());
        assert_eq!(asset.graph.len(), 5);
        assert_eq!(asset.graph.buffer_size(), 5);
    }

    #[test]
    fn test_asset_reports_validation_errors() {
        let result = BlendTreeLoader::asset_from_bytes(br#"Blend1D((name: "empty", children: []))"#);

        assert!(matches!(
            result,
            Err(TreeLoaderError::Validation(TreeValidationError::EmptyBlend(name))) if name == "empty"
        ));
    }

    #[test]
    fn test_loader_extensions() {
        assert_eq!(BlendTreeLoader.extensions(), &["blendtree.ron"]);
    }
}
