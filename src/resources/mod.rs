/**
 * This module contains the resources placed objects refer to.
 */
pub mod mesh;
