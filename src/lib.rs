pub mod app;
pub mod buscacursos;
pub mod catalogo;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod data;
pub mod logging;
pub mod utils;
