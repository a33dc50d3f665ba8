use dbus::blocking;

pub const ORG_BLUEZ_AGENT_MANAGER1_NAME: &str = "org.bluez.AgentManager1";

pub trait OrgBluezAgentManager1 {
    fn register_agent(&self, agent: dbus::Path, capability: &str) -> Result<(), dbus::Error>;
    fn unregister_agent(&self, agent: dbus::Path) -> Result<(), dbus::Error>;
    fn request_default_agent(&self, agent: dbus::Path) -> Result<(), dbus::Error>;
}

impl<'a, T: blocking::BlockingSender, C: ::std::ops::Deref<Target = T>> OrgBluezAgentManager1
    for blocking::Proxy<'a, C>
{
    fn register_agent(&self, agent: dbus::Path, capability: &str) -> Result<(), dbus::Error> {
        self.method_call(
            ORG_BLUEZ_AGENT_MANAGER1_NAME,
            "RegisterAgent",
            (agent, capability),
        )
    }

    fn unregister_agent(&self, agent: dbus::Path) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_AGENT_MANAGER1_NAME, "UnregisterAgent", (agent,))
    }

    fn request_default_agent(&self, agent: dbus::Path) -> Result<(), dbus::Error> {
        self.method_call(ORG_BLUEZ_AGENT_MANAGER1_NAME, "RequestDefaultAgent", (agent,))
    }
}
