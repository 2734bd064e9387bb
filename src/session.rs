//! The editing session: owner of every placement service.
//!
//! Nothing in the placement core is global. An [`EditingSession`] owns the scene,
//! the registries and the settings, and lends them to operations through a
//! [`PlacementContext`] for the duration of one call.

use log::{debug, info};

use crate::{
    collision::{CollisionFactory, StaticBodyFactory},
    data_structures::{
        instance::Transform,
        scene_graph::{Node, NodeId, SceneGraph},
    },
    input::EditorInput,
    placement::{
        drag::DragBatchPlanner,
        instancing::InstanceBufferManager,
        spawn::{Placement, PlacementContext, Selection, SpawnRequest, Spawner},
        waypoint::WaypointRegistry,
    },
    resources::mesh::{MeshId, MeshLibrary},
    settings::EditorSettings,
};

pub struct EditingSession {
    scene: SceneGraph,
    meshes: MeshLibrary,
    waypoints: WaypointRegistry,
    instances: InstanceBufferManager,
    settings: EditorSettings,
    collisions: Box<dyn CollisionFactory>,
    spawner: Spawner,
    drag: DragBatchPlanner,
    selection: Selection,
    plugin_root: NodeId,
}

impl EditingSession {
    pub fn new(settings: EditorSettings) -> Self {
        Self::with_collision_factory(settings, Box::new(StaticBodyFactory))
    }

    pub fn with_collision_factory(
        settings: EditorSettings,
        collisions: Box<dyn CollisionFactory>,
    ) -> Self {
        let mut scene = SceneGraph::new();
        let plugin_root = scene.insert(Node::group("PlacementPlugin"));
        let drag = DragBatchPlanner::from_settings(&settings);
        Self {
            scene,
            meshes: MeshLibrary::new(),
            waypoints: WaypointRegistry::new(),
            instances: InstanceBufferManager::new(),
            settings,
            collisions,
            spawner: Spawner::new(),
            drag,
            selection: Selection::default(),
            plugin_root,
        }
    }

    /// Creates a fresh root node and makes it the edited scene.
    pub fn open_scene(&mut self, name: &str) -> NodeId {
        let root = self.scene.insert(Node::group(name));
        self.scene.set_edited_root(root);
        info!("editing scene {}", name);
        root
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    pub fn meshes(&self) -> &MeshLibrary {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut MeshLibrary {
        &mut self.meshes
    }

    pub fn waypoints(&self) -> &WaypointRegistry {
        &self.waypoints
    }

    pub fn instances(&self) -> &InstanceBufferManager {
        &self.instances
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EditorSettings {
        &mut self.settings
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn drag(&self) -> &DragBatchPlanner {
        &self.drag
    }

    pub fn drag_mut(&mut self) -> &mut DragBatchPlanner {
        &mut self.drag
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    pub fn plugin_root(&self) -> NodeId {
        self.plugin_root
    }

    pub fn placement_context(&mut self) -> PlacementContext<'_> {
        self.split().0
    }

    fn split(&mut self) -> (PlacementContext<'_>, &mut Spawner, &mut DragBatchPlanner) {
        (
            PlacementContext {
                scene: &mut self.scene,
                waypoints: &mut self.waypoints,
                instances: &mut self.instances,
                settings: &mut self.settings,
                collisions: self.collisions.as_ref(),
                selection: &mut self.selection,
                plugin_root: self.plugin_root,
            },
            &mut self.spawner,
            &mut self.drag,
        )
    }

    pub fn spawn(&mut self, request: &SpawnRequest) -> Option<Placement> {
        let (mut ctx, spawner, _) = self.split();
        spawner.spawn(&mut ctx, request)
    }

    pub fn move_group(&mut self, proxy: NodeId, transform: Transform) -> bool {
        let (mut ctx, spawner, _) = self.split();
        spawner.move_group(&mut ctx, proxy, transform)
    }

    pub fn erase(&mut self, node: NodeId) -> bool {
        let (mut ctx, spawner, _) = self.split();
        spawner.erase(&mut ctx, node)
    }

    pub fn erase_instance(&mut self, mesh: MeshId, slot: usize) -> bool {
        let (mut ctx, spawner, _) = self.split();
        spawner.erase_instance(&mut ctx, mesh, slot)
    }

    pub fn on_input(&mut self, input: EditorInput) -> Vec<Placement> {
        let (mut ctx, spawner, drag) = self.split();
        drag.on_input(&mut ctx, spawner, input)
    }

    /// Pushes every instance buffer that changed since the last call to the GPU.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        for buffer in self.instances.buffers_mut() {
            buffer.write_to_buffer(device, queue);
        }
    }

    /// Clears all session state before the host unloads the plugin.
    ///
    /// Group proxies pushed into the edited scene only stand for instance buffer
    /// slots, so they go together with the buffers.
    pub fn teardown(&mut self) {
        let (mut ctx, _, drag) = self.split();
        drag.cancel(&mut ctx);

        for body in self.instances.collision_nodes() {
            self.scene.free(body);
        }
        let proxies: Vec<NodeId> = self
            .scene
            .edited_root()
            .map(|root| self.scene.descendants(root))
            .unwrap_or_default()
            .into_iter()
            .filter(|id| self.scene.node(*id).is_some_and(Node::is_group_proxy))
            .collect();
        for proxy in proxies {
            self.scene.free(proxy);
        }
        self.instances.clear_all();
        self.waypoints.clear();

        let plugin_owned = self.scene.children(self.plugin_root).to_vec();
        for node in plugin_owned {
            self.scene.free(node);
        }
        self.selection.clear();
        debug!("placement session torn down");
    }
}
