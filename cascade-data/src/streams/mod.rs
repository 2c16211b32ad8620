/// Idle timeout wrapper that ends silent streams.
pub mod timeout;
