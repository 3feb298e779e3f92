pub mod city;
pub mod export;
pub mod generation;
pub mod geometry;
pub mod render;
