//! Dataset pipelines
//!
//! Entry points that wire the catalog, the per-element transforms and the
//! loader together for a concrete dataset.

pub mod oxford_iiit_pet;

pub use oxford_iiit_pet::{
    discriminator_pipeline, oxford_iiit_pet_dataset, oxford_iiit_pet_dataset_d, sr_pipeline,
    DiscriminatorMapper, PetInputs, SrMapper,
};
