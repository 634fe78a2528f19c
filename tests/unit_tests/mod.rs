mod assembly;
mod basis;
mod htree;
mod repair;
mod topology;
