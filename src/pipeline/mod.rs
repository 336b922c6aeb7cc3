pub mod validation;
pub mod preprocess;
pub mod classify;
pub mod explain; // LIME-style superpixel attribution
pub mod diagnostic; // Pipeline diagnostic dump (BRAINSCAN_DUMP_DIR)
pub mod orchestrator;
