use aemcheck_domain::{ExtensionInstanceView, ExtensionRef, VirtualMachine, VirtualMachineInstanceView};

/// Installed extension with exactly this type and publisher.
pub fn find_extension<'a>(
    vm: &'a VirtualMachine,
    extension_type: &str,
    publisher: &str,
) -> Option<&'a ExtensionRef> {
    vm.resources
        .iter()
        .find(|ext| ext.extension_type == extension_type && ext.publisher == publisher)
}

/// Runtime status of the extension [`find_extension`] would return, matched
/// by extension name.
pub fn find_extension_status<'a>(
    vm: &VirtualMachine,
    view: &'a VirtualMachineInstanceView,
    extension_type: &str,
    publisher: &str,
) -> Option<&'a ExtensionInstanceView> {
    let ext = find_extension(vm, extension_type, publisher)?;
    view.extensions.iter().find(|status| status.name == ext.name)
}
