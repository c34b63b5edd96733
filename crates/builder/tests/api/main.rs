mod helpers;
mod monitor;
mod pipeline;
