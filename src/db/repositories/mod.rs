mod catalog;
mod readings;
mod settings;
mod state_records;
mod workplaces;
