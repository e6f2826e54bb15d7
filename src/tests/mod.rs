//! Cross-component integration tests.
