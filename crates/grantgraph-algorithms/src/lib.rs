pub mod common;
pub mod centrality;
pub mod community;
pub mod pathfinding;
pub mod similarity;
pub mod topology;

pub use common::{CancelToken, GraphView, NodeId};
pub use centrality::{betweenness_centrality, betweenness_proxy, closeness_centrality, degree_centrality};
pub use community::{louvain, modularity, weakly_connected_components, CommunityResult, LouvainConfig, WccResult};
pub use pathfinding::{all_simple_paths, bfs_distances, SimplePaths};
pub use similarity::jaccard;
pub use topology::local_clustering;
