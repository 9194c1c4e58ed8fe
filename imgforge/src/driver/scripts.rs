//! PowerShell script templates for the Hyper-V driver.
//!
//! Every interpolated string goes through the `ps` filter (single-quoted
//! literal); booleans go through `psbool`. Cmdlets are module-qualified so a
//! same-named VMware PowerCLI cmdlet can never shadow them.

pub(super) const TEMPLATES: &[(&str, &str)] = &[
    ("ps_version", "$host.version.Major"),
    (
        "hyperv_module",
        r#"function foo(){try{ $commands = Get-Command -Module Hyper-V;if($commands.Length -eq 0){return $false} }catch{return $false}; return $true} foo"#,
    ),
    (
        "is_hyperv_admin",
        r#"$identity = [System.Security.Principal.WindowsIdentity]::GetCurrent()
$principal = new-object System.Security.Principal.WindowsPrincipal($identity)
$hypervrole = [System.Security.Principal.SecurityIdentifier]"S-1-5-32-578"
return $principal.IsInRole($hypervrole)"#,
    ),
    (
        "is_admin",
        r#"$identity = [System.Security.Principal.WindowsIdentity]::GetCurrent()
$principal = new-object System.Security.Principal.WindowsPrincipal($identity)
$administratorRole = [System.Security.Principal.WindowsBuiltInRole]::Administrator
return $principal.IsInRole($administratorRole)"#,
    ),
    (
        "is_running",
        r#"$vm = Hyper-V\Get-VM -Name {{ vm_name|ps }} -ErrorAction SilentlyContinue
$vm.State -eq [Microsoft.HyperV.PowerShell.VMState]::Running"#,
    ),
    (
        "is_off",
        r#"$vm = Hyper-V\Get-VM -Name {{ vm_name|ps }} -ErrorAction SilentlyContinue
$vm.State -eq [Microsoft.HyperV.PowerShell.VMState]::Off"#,
    ),
    (
        "uptime",
        r#"$vm = Hyper-V\Get-VM -Name {{ vm_name|ps }} -ErrorAction SilentlyContinue
[math]::Floor($vm.Uptime.TotalSeconds)"#,
    ),
    (
        "start_vm",
        r#"$vm = Hyper-V\Get-VM -Name {{ vm_name|ps }} -ErrorAction SilentlyContinue
if ($vm.State -eq [Microsoft.HyperV.PowerShell.VMState]::Off) {
  Hyper-V\Start-VM -Name {{ vm_name|ps }} -Confirm:$false
}"#,
    ),
    (
        "stop_vm",
        r#"$vm = Hyper-V\Get-VM -Name {{ vm_name|ps }}
if ($vm.State -eq [Microsoft.HyperV.PowerShell.VMState]::Running) {
  Hyper-V\Stop-VM -VM $vm -Force -Confirm:$false
}"#,
    ),
    (
        "restart_vm",
        r#"Hyper-V\Restart-VM -Name {{ vm_name|ps }} -Force -Confirm:$false"#,
    ),
    (
        "mac",
        r#"try {
  $adapter = Hyper-V\Get-VMNetworkAdapter -VMName {{ vm_name|ps }} -ErrorAction SilentlyContinue | Select-Object -First 1
  $adapter.MacAddress
} catch {
  return ""
}"#,
    ),
    (
        "ip_address",
        r#"try {
  $ip = Hyper-V\Get-VM | Where-Object { $_.State -eq 'Running' } | Hyper-V\Get-VMNetworkAdapter | Where-Object { $_.MacAddress -eq {{ mac|ps }} } | ForEach-Object { $_.IPAddresses } | Where-Object { $_ -match '^\d+\.\d+\.\d+\.\d+$' } | Select-Object -First 1
  $ip
} catch {
  return ""
}"#,
    ),
    (
        "host_name",
        r#"try {
  [System.Net.Dns]::GetHostEntry({{ ip|ps }}).HostName
} catch {
  return ""
}"#,
    ),
    (
        "host_adapter_ip",
        r#"$HostVMAdapter = Hyper-V\Get-VMNetworkAdapter -ManagementOS -SwitchName {{ switch_name|ps }} -ErrorAction SilentlyContinue | Select-Object -First 1
if ($HostVMAdapter) {
  $HostNetAdapter = Get-NetAdapter | Where-Object { $_.DeviceID -eq $HostVMAdapter.DeviceId }
  if ($HostNetAdapter) {
    $address = Get-NetIPAddress -InterfaceIndex $HostNetAdapter.ifIndex -AddressFamily IPv4 -ErrorAction SilentlyContinue | Select-Object -First 1
    if ($address) { return $address.IPAddress }
  }
}
return """#,
    ),
    (
        "type_scan_codes",
        r#"$vmName = {{ vm_name|ps }}
$scanCodes = {{ scan_codes|ps }}
$vm = Get-CimInstance -Namespace "root\virtualization\v2" -ClassName Msvm_ComputerSystem -Filter "ElementName='$vmName'"
$keyboard = Get-CimAssociatedInstance -InputObject $vm -ResultClassName Msvm_Keyboard
$bytes = [byte[]]($scanCodes.Split(' ', [System.StringSplitOptions]::RemoveEmptyEntries) | ForEach-Object { [Convert]::ToByte($_, 16) })
Invoke-CimMethod -InputObject $keyboard -MethodName TypeScancodes -Arguments @{ Scancodes = $bytes } | Out-Null"#,
    ),
    (
        "vm_adapter_address",
        r#"$adapter = Hyper-V\Get-VMNetworkAdapter -VMName {{ vm_name|ps }} | Select-Object -First 1
$adapter.IPAddresses | Where-Object { $_ -match '^\d+\.\d+\.\d+\.\d+$' } | Select-Object -First 1"#,
    ),
    (
        "set_switch_vlan",
        r#"Hyper-V\Set-VMNetworkAdapterVlan -ManagementOS -VMNetworkAdapterName {{ switch_name|ps }} -Access -VlanId {{ vlan_id|ps }}"#,
    ),
    (
        "set_vm_vlan",
        r#"Hyper-V\Set-VMNetworkAdapterVlan -VMName {{ vm_name|ps }} -Access -VlanId {{ vlan_id|ps }}"#,
    ),
    (
        "set_vm_mac",
        r#"Hyper-V\Set-VMNetworkAdapter -VMName {{ vm_name|ps }} -StaticMacAddress {{ mac|ps }}"#,
    ),
    (
        "replace_adapter",
        r#"$switchName = (Hyper-V\Get-VMNetworkAdapter -VMName {{ vm_name|ps }} | Select-Object -First 1).SwitchName
Hyper-V\Remove-VMNetworkAdapter -VMName {{ vm_name|ps }}
Hyper-V\Add-VMNetworkAdapter -VMName {{ vm_name|ps }} -SwitchName $switchName -IsLegacy {{ legacy|psbool }}"#,
    ),
    (
        "untag_vlan",
        r#"Hyper-V\Set-VMNetworkAdapterVlan -VMName {{ vm_name|ps }} -Untagged
Hyper-V\Set-VMNetworkAdapterVlan -ManagementOS -VMNetworkAdapterName {{ switch_name|ps }} -Untagged"#,
    ),
    (
        "create_external_switch",
        r#"$adapters = @(Get-NetAdapter -Physical | Where-Object { $_.Status -eq 'Up' })
if ($adapters.Count -eq 0) { throw 'No physical network adapter is up' }
$adapter = $adapters | Select-Object -First 1
Hyper-V\New-VMSwitch -Name {{ switch_name|ps }} -NetAdapterName $adapter.Name -AllowManagementOS $true | Out-Null
Hyper-V\Get-VMNetworkAdapter -VMName {{ vm_name|ps }} | Hyper-V\Connect-VMNetworkAdapter -SwitchName {{ switch_name|ps }}"#,
    ),
    (
        "vm_switch_name",
        r#"(Hyper-V\Get-VMNetworkAdapter -VMName {{ vm_name|ps }} | Select-Object -First 1).SwitchName"#,
    ),
    (
        "connect_adapter",
        r#"Hyper-V\Get-VMNetworkAdapter -VMName {{ vm_name|ps }} | Hyper-V\Connect-VMNetworkAdapter -SwitchName {{ switch_name|ps }}"#,
    ),
    (
        "create_switch",
        r#"$switches = @(Hyper-V\Get-VMSwitch -Name {{ switch_name|ps }} -ErrorAction SilentlyContinue)
if ($switches.Count -eq 0) {
  Hyper-V\New-VMSwitch -Name {{ switch_name|ps }} -SwitchType {{ switch_type|ps }} | Out-Null
  return $true
}
return $false"#,
    ),
    (
        "delete_switch",
        r#"$switch = Hyper-V\Get-VMSwitch -Name {{ switch_name|ps }} -ErrorAction SilentlyContinue
if ($switch -ne $null) {
  $switch | Hyper-V\Remove-VMSwitch -Force -Confirm:$false
}"#,
    ),
    (
        "create_vm",
        r#"$vmName = {{ spec.vm_name|ps }}
$path = {{ spec.path|ps }}
$memory = {{ spec.ram_mb }}MB
{% if spec.hard_drive_path and spec.differencing_disk -%}
$vhdPath = Join-Path -Path $path -ChildPath ($vmName + '.vhdx')
Hyper-V\New-VHD -Path $vhdPath -ParentPath {{ spec.hard_drive_path|ps }} -Differencing -BlockSizeBytes {{ spec.disk_block_size_mb }}MB | Out-Null
Hyper-V\New-VM -Name $vmName -Path $path -MemoryStartupBytes $memory -VHDPath $vhdPath -SwitchName {{ spec.switch_name|ps }} -Generation {{ spec.generation }}{% if spec.version %} -Version {{ spec.version|ps }}{% endif %} | Out-Null
{%- elif spec.hard_drive_path -%}
Hyper-V\New-VM -Name $vmName -Path $path -MemoryStartupBytes $memory -VHDPath {{ spec.hard_drive_path|ps }} -SwitchName {{ spec.switch_name|ps }} -Generation {{ spec.generation }}{% if spec.version %} -Version {{ spec.version|ps }}{% endif %} | Out-Null
{%- else -%}
$vhdPath = Join-Path -Path $path -ChildPath ($vmName + '.vhdx')
Hyper-V\New-VHD -Path $vhdPath -SizeBytes {{ spec.disk_size_mb }}MB -BlockSizeBytes {{ spec.disk_block_size_mb }}MB{% if spec.fixed_vhd %} -Fixed{% else %} -Dynamic{% endif %} | Out-Null
Hyper-V\New-VM -Name $vmName -Path $path -MemoryStartupBytes $memory -VHDPath $vhdPath -SwitchName {{ spec.switch_name|ps }} -Generation {{ spec.generation }}{% if spec.version %} -Version {{ spec.version|ps }}{% endif %} | Out-Null
{%- endif %}"#,
    ),
    (
        "add_hard_drive",
        r#"$vhdPath = Join-Path -Path {{ spec.vhd_dir|ps }} -ChildPath {{ spec.vhd_name|ps }}
Hyper-V\New-VHD -Path $vhdPath -SizeBytes {{ spec.size_bytes }} -BlockSizeBytes {{ spec.block_size_bytes }} | Out-Null
Hyper-V\Add-VMHardDiskDrive -VMName {{ spec.vm_name|ps }} -Path $vhdPath -ControllerType {{ spec.controller_type|ps }}"#,
    ),
    (
        "clone_vm",
        r#"$exportPath = Join-Path -Path {{ spec.path|ps }} -ChildPath 'clone-source'
{% if spec.from_vm_name -%}
{% if spec.from_snapshot_name -%}
$snapshot = Hyper-V\Get-VMSnapshot -VMName {{ spec.from_vm_name|ps }} -Name {{ spec.from_snapshot_name|ps }}
Hyper-V\Export-VMSnapshot -VMSnapshot $snapshot -Path $exportPath
{%- elif spec.all_snapshots -%}
Hyper-V\Export-VM -Name {{ spec.from_vm_name|ps }} -Path $exportPath
{%- else -%}
Hyper-V\Export-VM -Name {{ spec.from_vm_name|ps }} -Path $exportPath -CaptureLiveState CaptureSavedState
{%- endif %}
$sourcePath = $exportPath
{%- else -%}
$sourcePath = {{ spec.from_vmcx_path|ps }}
{%- endif %}
$vmcx = Get-ChildItem -Path $sourcePath -Recurse -Filter *.vmcx | Select-Object -First 1
$vmPath = {{ spec.path|ps }}
$vhdPath = Join-Path -Path $vmPath -ChildPath 'Virtual Hard Disks'
{% if spec.copy -%}
$vm = Hyper-V\Import-VM -Path $vmcx.FullName -Copy -GenerateNewId -VirtualMachinePath $vmPath -VhdDestinationPath $vhdPath -SnapshotFilePath $vmPath -SmartPagingFilePath $vmPath
{%- else -%}
$vm = Hyper-V\Import-VM -Path $vmcx.FullName -Register
{%- endif %}
Hyper-V\Rename-VM -VM $vm -NewName {{ spec.vm_name|ps }}
Hyper-V\Set-VMMemory -VMName {{ spec.vm_name|ps }} -StartupBytes {{ spec.ram_mb }}MB
Hyper-V\Get-VMNetworkAdapter -VMName {{ spec.vm_name|ps }} | Hyper-V\Connect-VMNetworkAdapter -SwitchName {{ spec.switch_name|ps }}
{% if spec.from_vm_name -%}
Remove-Item -Path $exportPath -Recurse -Force
{%- endif %}"#,
    ),
    (
        "delete_vm",
        r#"$vm = Hyper-V\Get-VM -Name {{ vm_name|ps }}
if (($vm.State -ne [Microsoft.HyperV.PowerShell.VMState]::Off) -and ($vm.State -ne [Microsoft.HyperV.PowerShell.VMState]::OffCritical)) {
  Hyper-V\Stop-VM -VM $vm -TurnOff -Force -Confirm:$false
}
Hyper-V\Remove-VM -Name {{ vm_name|ps }} -Force -Confirm:$false"#,
    ),
    (
        "vm_generation",
        r#"(Hyper-V\Get-VM -Name {{ vm_name|ps }}).Generation"#,
    ),
    (
        "set_cpu_count",
        r#"Hyper-V\Set-VMProcessor -VMName {{ vm_name|ps }} -Count {{ cpus }}"#,
    ),
    (
        "set_mac_spoofing",
        r#"Hyper-V\Set-VMNetworkAdapter -VMName {{ vm_name|ps }} -MacAddressSpoofing {{ 'On' if enable else 'Off' }}"#,
    ),
    (
        "set_dynamic_memory",
        r#"Hyper-V\Set-VMMemory -VMName {{ vm_name|ps }} -DynamicMemoryEnabled {{ enable|psbool }}"#,
    ),
    (
        "set_secure_boot",
        r#"Hyper-V\Set-VMFirmware -VMName {{ vm_name|ps }} -EnableSecureBoot {{ 'On' if enable else 'Off' }}{% if template %} -SecureBootTemplate {{ template|ps }}{% endif %}"#,
    ),
    (
        "set_virtualization_extensions",
        r#"Hyper-V\Set-VMProcessor -VMName {{ vm_name|ps }} -ExposeVirtualizationExtensions {{ enable|psbool }}"#,
    ),
    (
        "enable_integration_service",
        r#"Hyper-V\Enable-VMIntegrationService -VMName {{ vm_name|ps }} -Name {{ service|ps }}"#,
    ),
    (
        "export_vm",
        r#"Hyper-V\Export-VM -Name {{ vm_name|ps }} -Path {{ path|ps }}"#,
    ),
    (
        "preserve_legacy_export",
        r#"$src = {{ src|ps }}
$dst = {{ dst|ps }}
New-Item -ItemType Directory -Force -Path $dst | Out-Null
Get-ChildItem -Path $src -Directory | Where-Object { @('Virtual Hard Disks', 'Virtual Machines', 'Snapshots') -contains $_.Name } | Move-Item -Destination $dst -Force"#,
    ),
    (
        "move_vhds",
        r#"$dst = Join-Path -Path {{ dst|ps }} -ChildPath 'Virtual Hard Disks'
New-Item -ItemType Directory -Force -Path $dst | Out-Null
Get-ChildItem -Path {{ src|ps }} -Recurse -File -Include *.vhd,*.vhdx | Move-Item -Destination $dst -Force"#,
    ),
    (
        "compact_disks",
        r#"$result = ''
Get-ChildItem -Path {{ path|ps }} -Recurse -File -Include *.vhd,*.vhdx | ForEach-Object {
  $before = $_.Length
  Hyper-V\Optimize-VHD -Path $_.FullName -Mode Full
  $after = (Get-Item $_.FullName).Length
  $result += "Compacted $($_.FullName) from $before to $after bytes`n"
}
$result"#,
    ),
    (
        "create_dvd",
        r#"{% if generation == 2 -%}
$dvd = Hyper-V\Add-VMDvdDrive -VMName {{ vm_name|ps }} -Path {{ iso_path|ps }} -Passthru
{%- else -%}
$dvd = Hyper-V\Add-VMDvdDrive -VMName {{ vm_name|ps }} -Path {{ iso_path|ps }} -ControllerNumber 1 -Passthru
{%- endif %}
$dvd | Hyper-V\Set-VMDvdDrive -Path $null
$dvd | Select-Object ControllerNumber, ControllerLocation | ConvertTo-Json -Compress"#,
    ),
    (
        "mount_dvd",
        r#"Hyper-V\Set-VMDvdDrive -VMName {{ vm_name|ps }} -Path {{ path|ps }} -ControllerNumber {{ controller_number }} -ControllerLocation {{ controller_location }}"#,
    ),
    (
        "set_boot_dvd",
        r#"{% if generation == 2 -%}
$dvd = Hyper-V\Get-VMDvdDrive -VMName {{ vm_name|ps }} -ControllerNumber {{ controller_number }} -ControllerLocation {{ controller_location }}
Hyper-V\Set-VMFirmware -VMName {{ vm_name|ps }} -FirstBootDevice $dvd
{%- else -%}
Hyper-V\Set-VMBios -VMName {{ vm_name|ps }} -StartupOrder @('CD', 'IDE', 'LegacyNetworkAdapter', 'Floppy')
{%- endif %}"#,
    ),
    (
        "unmount_dvd",
        r#"Hyper-V\Get-VMDvdDrive -VMName {{ vm_name|ps }} -ControllerNumber {{ controller_number }} -ControllerLocation {{ controller_location }} | Hyper-V\Set-VMDvdDrive -Path $null"#,
    ),
    (
        "delete_dvd",
        r#"Hyper-V\Get-VMDvdDrive -VMName {{ vm_name|ps }} -ControllerNumber {{ controller_number }} -ControllerLocation {{ controller_location }} | Hyper-V\Remove-VMDvdDrive"#,
    ),
    (
        "mount_floppy",
        r#"Hyper-V\Set-VMFloppyDiskDrive -VMName {{ vm_name|ps }} -Path {{ path|ps }}"#,
    ),
    (
        "unmount_floppy",
        r#"Hyper-V\Set-VMFloppyDiskDrive -VMName {{ vm_name|ps }} -Path $null"#,
    ),
    (
        "connect_vm",
        r#"$process = Start-Process -FilePath 'vmconnect.exe' -ArgumentList @('localhost', {{ vm_name|ps }}) -PassThru
$process.Id"#,
    ),
    (
        "disconnect_vm",
        r#"Stop-Process -Id {{ process_id }} -Force -ErrorAction SilentlyContinue"#,
    ),
];
