use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

pub mod config;
pub mod systems;

#[cfg(test)]
pub mod test;

// import modules here
use systems::generation::CityGenerationPlugin;
use systems::render::TileRenderPlugin;

fn main() -> bevy::app::AppExit {
    App::new()
        // headless, the tile renderer quits the app once its tiles are written
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(10))))
        .add_plugins(LogPlugin::default())

        // my custom plugins
        .add_plugins(CityGenerationPlugin)
        .add_plugins(TileRenderPlugin)
        .run()
}
