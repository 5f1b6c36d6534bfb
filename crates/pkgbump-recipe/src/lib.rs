#![allow(clippy::missing_errors_doc)]

mod edit;
mod state;

pub use edit::{RecipeEdit, RecipeFile, RecipeTemplate, RecipeUpdate};
pub use state::{RecipeError, RecipeFields, RecipeState};
