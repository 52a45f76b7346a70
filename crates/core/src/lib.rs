pub mod detection;
pub mod imaging;
pub mod matching;
pub mod pipeline;
pub mod shared;
pub mod store;
