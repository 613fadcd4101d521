use precull_types::MAX_LOD;
use wgpu::Buffer;

use crate::{error::CullerInitializationError, util::typedefs::FastHashMap};

/// Geometry for one LOD level, uploaded by the host before the culler is
/// built.
pub struct LodMesh {
    pub name: String,
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

/// Name-to-mesh lookup built once at startup and read-only thereafter.
///
/// Holds exactly one mesh per LOD level, in LOD order; a count mismatch is
/// a fatal configuration error.
pub struct MeshRegistry {
    meshes: Vec<LodMesh>,
    by_name: FastHashMap<String, usize>,
}

impl MeshRegistry {
    pub fn new(meshes: Vec<LodMesh>) -> Result<Self, CullerInitializationError> {
        if meshes.len() != MAX_LOD {
            return Err(CullerInitializationError::LodMeshCountMismatch { actual: meshes.len() });
        }

        let mut by_name = FastHashMap::default();
        for (index, mesh) in meshes.iter().enumerate() {
            if by_name.insert(mesh.name.clone(), index).is_some() {
                return Err(CullerInitializationError::DuplicateMeshName(mesh.name.clone()));
            }
        }

        Ok(Self { meshes, by_name })
    }

    /// The mesh rendered for the given LOD level.
    pub fn lod(&self, lod: usize) -> &LodMesh {
        &self.meshes[lod]
    }

    pub fn get(&self, name: &str) -> Option<&LodMesh> {
        self.by_name.get(name).map(|&index| &self.meshes[index])
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
