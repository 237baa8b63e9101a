mod commands;
mod lifecycle;
