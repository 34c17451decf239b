mod api;

pub use api::{
    EndpointInfo, GenerateResponse, GenerationMetadata, HealthResponse, ServiceInfo,
    StatsResponse, TierStats,
};
