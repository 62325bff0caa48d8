use std::sync::Arc;
use stickswitch::backends::virtual_input::VirtualIo;
use stickswitch::{
    AxisToAxis, ButtonToAxis, Channel, Context, Device, DeviceBinding, DeviceKind, EngineConfig,
    Plugin,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stickswitch=info")),
        )
        .init();

    let io = Arc::new(VirtualIo::new());
    let mut ctx = Context::new(io.clone(), EngineConfig::default());

    // One physical stick, one virtual output device
    let stick = ctx.add_device_group(DeviceKind::Joystick, "Joystick-1");
    ctx.add_device_to_group(
        DeviceKind::Joystick,
        stick,
        Device::new("joy:0", DeviceKind::Joystick, "Flight Stick"),
    )?;
    let vjoy = ctx.add_device_group(DeviceKind::Generic, "vJoy");
    ctx.add_device_to_group(
        DeviceKind::Generic,
        vjoy,
        Device::new("vjoy:0", DeviceKind::Generic, "vJoy Device 1"),
    )?;

    let game = ctx.add_profile("Game")?;
    ctx.add_plugin(
        game,
        Plugin::new(
            "Afterburner",
            ButtonToAxis::new(
                DeviceBinding::input(DeviceKind::Joystick, stick, "joy:0", Channel::button(0)),
                DeviceBinding::output(DeviceKind::Generic, vjoy, "vjoy:0", Channel::axis(2)),
            ),
        ),
    )?;
    ctx.add_plugin(
        game,
        Plugin::new(
            "Pitch",
            AxisToAxis::new(
                DeviceBinding::input(DeviceKind::Joystick, stick, "joy:0", Channel::axis(1)),
                DeviceBinding::output(DeviceKind::Generic, vjoy, "vjoy:0", Channel::axis(1)),
            ),
        ),
    )?;

    ctx.on_active_profile_changed(|| {
        println!("(Demo) active profile changed");
        Ok(())
    });

    ctx.activate_profile(game)?;
    io.press_button("joy:0", 0);
    io.set_axis("joy:0", 1, -12000);
    io.release_button("joy:0", 0);

    for w in io.take_writes() {
        println!("(Demo) {} {} = {}", w.device, w.channel, w.value);
    }

    ctx.deactivate_profile(Some(game))?;
    let delivered = io.press_button("joy:0", 0);
    println!(
        "(Demo) after deactivation: {} subscriber(s), {} write(s)",
        delivered,
        io.writes().len()
    );

    Ok(())
}
