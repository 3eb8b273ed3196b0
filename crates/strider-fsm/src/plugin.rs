//! Bevy ECS adapter for the control context.
//!
//! Optional integration for hosts that run the controller inside a Bevy
//! app (simulators, visualizers). The transport collaborators write
//! [`SensorInput`] and [`CommandInput`] resources; the control system ticks
//! the context once per update and publishes [`ActuatorOutput`].
//!
//! The core itself never depends on the ECS; this module is the only place
//! that does, behind the `bevy` feature.

use bevy::prelude::{App, Plugin, Res, ResMut, Resource, Update};

use strider_core::types::{JointCommands, SensorSample, UserCommand};

use crate::context::ControlContext;
use crate::mode::Mode;

/// The control context as an ECS resource.
#[derive(Resource)]
pub struct StriderController(pub ControlContext);

/// Last user command, written by the input collaborator. Last value wins.
#[derive(Resource, Default)]
pub struct CommandInput(pub UserCommand);

/// Most recent sensor snapshot, written by the transport collaborator.
#[derive(Resource, Default)]
pub struct SensorInput(pub SensorSample);

/// Joint commands published after every control tick.
#[derive(Resource, Default)]
pub struct ActuatorOutput {
    pub commands: JointCommands,
    pub mode: Mode,
}

/// Adds the per-update control tick. Insert [`StriderController`] (and the
/// input resources) after constructing the context.
pub struct StriderControlPlugin;

impl Plugin for StriderControlPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CommandInput>()
            .init_resource::<SensorInput>()
            .init_resource::<ActuatorOutput>()
            .add_systems(Update, control_tick_system);
    }
}

#[allow(clippy::needless_pass_by_value)]
fn control_tick_system(
    controller: Option<ResMut<StriderController>>,
    command: Option<Res<CommandInput>>,
    sensors: Option<Res<SensorInput>>,
    output: Option<ResMut<ActuatorOutput>>,
) {
    let (Some(mut controller), Some(command), Some(sensors), Some(mut output)) =
        (controller, command, sensors, output)
    else {
        return;
    };

    let result = controller.0.tick(&command.0, &sensors.0);
    output.commands = result.commands;
    output.mode = result.mode;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_core::config::StriderConfig;

    #[test]
    fn controller_resource_ticks_through_app() {
        let mut app = App::new();
        app.add_plugins(StriderControlPlugin);
        app.insert_resource(StriderController(
            ControlContext::new(StriderConfig::default()).unwrap(),
        ));

        app.update();
        app.update();

        let controller = app.world().resource::<StriderController>();
        assert_eq!(controller.0.ticks(), 2);
        let output = app.world().resource::<ActuatorOutput>();
        assert_eq!(output.mode, Mode::Passive);
    }
}
