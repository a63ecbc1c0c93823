pub mod identity;
pub mod merge;
pub mod normalize;
pub mod orchestrator;
pub mod provider;
pub mod resolver;
pub mod sink;
pub mod store;

pub mod util {
    pub mod env;
}
