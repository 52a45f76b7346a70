pub mod identity_matcher;
