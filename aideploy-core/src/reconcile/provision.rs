use tracing::{info, info_span};
use uuid::Uuid;

use crate::adapter::CmkAdapter;
use crate::catalog;
use crate::error::Result;
use crate::mutators::{disk, firewall, ip, keypair, network, snapshot, vm};
use crate::spec::{CatalogIds, DesiredSpec, ProjectIdentity, ProvisionOutput};
use crate::state;

/// Resolves every catalog name to an ID. Any miss is fatal before any
/// mutation runs (phase 1).
async fn resolve_catalog(cmk: &dyn CmkAdapter, spec: &DesiredSpec) -> Result<CatalogIds> {
    let zone_id = catalog::resolve_zone(cmk, &spec.zone).await?;
    let all_zone_ids = catalog::resolve_all_zone_ids(cmk).await?;
    let network_offering_id = catalog::resolve_network_offering(cmk).await?;
    let disk_offering_id = catalog::resolve_disk_offering(cmk).await?;
    let template_id = catalog::discover_template(cmk, &zone_id).await?;
    let web_offering_id = catalog::resolve_service_offering(cmk, spec.web_plan.as_str()).await?;

    let worker_offering_id = match spec.workers_plan {
        Some(plan) => Some(catalog::resolve_service_offering(cmk, plan.as_str()).await?),
        None => None,
    };
    let db_offering_id = match spec.db_plan {
        Some(plan) => Some(catalog::resolve_service_offering(cmk, plan.as_str()).await?),
        None => None,
    };

    Ok(CatalogIds {
        zone_id,
        all_zone_ids,
        network_offering_id,
        disk_offering_id,
        template_id,
        web_offering_id,
        worker_offering_id,
        db_offering_id,
    })
}

/// Drives every mutator primitive, in order, to converge the account toward
/// `spec`. Safe to re-run after a partial failure; a second call against an
/// unchanged spec converges with no further writes.
pub async fn provision(
    cmk: &dyn CmkAdapter,
    spec: &DesiredSpec,
    identity: &ProjectIdentity,
    public_key: &str,
) -> Result<ProvisionOutput> {
    spec.validate()?;

    let network_name = identity.network_name();
    let run_id = Uuid::new_v4();
    let _span = info_span!("provision", %run_id, network = %network_name).entered();
    info!("starting provision");

    // 1. Resolve.
    let catalog = resolve_catalog(cmk, spec).await?;

    let mut out = ProvisionOutput {
        network_name: network_name.clone(),
        ..Default::default()
    };

    // 2. Network.
    let network_id = network::ensure_network(
        cmk,
        &network_name,
        &catalog.network_offering_id,
        &catalog.zone_id,
    )
    .await?;
    out.network_id = Some(network_id.clone());

    // 3. Keypair.
    let keypair_name = identity.keypair_name();
    keypair::ensure_keypair(cmk, &keypair_name, public_key).await?;
    out.keypair_name = Some(keypair_name.clone());

    // 4. VMs: web -> worker-1..N -> db.
    let web_vm_name = identity.web_vm_name();
    let web_vm_id = vm::deploy_or_scale_vm(
        cmk,
        &web_vm_name,
        &catalog.web_offering_id,
        &catalog.template_id,
        &catalog.zone_id,
        &network_id,
        &keypair_name,
        None,
    )
    .await?;
    out.web_vm_id = Some(web_vm_id.clone());

    let mut worker_vm_ids = Vec::new();
    if spec.workers_enabled {
        let worker_offering_id = catalog
            .worker_offering_id
            .as_deref()
            .expect("validate() guarantees workers_plan is set when workers_enabled");
        for i in 1..=spec.workers_replicas {
            let name = identity.worker_vm_name(i);
            let id = vm::deploy_or_scale_vm(
                cmk,
                &name,
                worker_offering_id,
                &catalog.template_id,
                &catalog.zone_id,
                &network_id,
                &keypair_name,
                None,
            )
            .await?;
            worker_vm_ids.push(id);
        }
    }

    let db_vm_id = if spec.db_enabled {
        let db_offering_id = catalog
            .db_offering_id
            .as_deref()
            .expect("validate() guarantees db_plan is set when db_enabled");
        let name = identity.db_vm_name();
        Some(
            vm::deploy_or_scale_vm(
                cmk,
                &name,
                db_offering_id,
                &catalog.template_id,
                &catalog.zone_id,
                &network_id,
                &keypair_name,
                None,
            )
            .await?,
        )
    } else {
        None
    };

    // 5. Excess workers: starting at N+1, remove while a VM exists.
    let desired_workers = if spec.workers_enabled { spec.workers_replicas } else { 0 };
    let mut excess_idx = desired_workers + 1;
    loop {
        let name = identity.worker_vm_name(excess_idx);
        let Some(found) = state::find_vm(cmk, &name).await else {
            break;
        };
        vm::remove_excess_worker(cmk, &name, &found.id, &network_id).await?;
        excess_idx += 1;
    }

    // 6. IP wiring. Ordered role -> VM-ID list; never reassigns an
    // already-correct pairing (see mutators::ip).
    let web_ip = ip::ensure_ip_for_vm(cmk, &network_id, &web_vm_id, "web").await?;
    out.web_ip = Some(web_ip.ip_address.clone());
    out.web_ip_id = Some(web_ip.id.clone());

    let mut worker_ips = Vec::new();
    for (i, wid) in worker_vm_ids.iter().enumerate() {
        let label = format!("worker-{}", i + 1);
        let wip = ip::ensure_ip_for_vm(cmk, &network_id, wid, &label).await?;
        worker_ips.push(wip);
    }

    let db_ip = if let Some(dbid) = &db_vm_id {
        Some(ip::ensure_ip_for_vm(cmk, &network_id, dbid, "db").await?)
    } else {
        None
    };

    // 7. Firewall.
    firewall::ensure_firewall_rules(cmk, &web_ip.id, firewall::WEB_PORTS, "web").await?;
    for (i, wip) in worker_ips.iter().enumerate() {
        let label = format!("worker-{}", i + 1);
        firewall::ensure_firewall_rules(cmk, &wip.id, firewall::SSH_ONLY_PORTS, &label).await?;
    }
    if let Some(dip) = &db_ip {
        firewall::ensure_firewall_rules(cmk, &dip.id, firewall::SSH_ONLY_PORTS, "db").await?;
    }

    // 8. Data disks.
    let deploy_tag = identity.deploy_tag();
    let blob_disk_name = identity.blob_disk_name();
    let blob_volume_id = disk::create_or_resize_disk(
        cmk,
        &blob_disk_name,
        &catalog.disk_offering_id,
        &catalog.zone_id,
        spec.blob_disk_size_gb,
        &web_vm_id,
        &deploy_tag,
        "blob disk (web)",
    )
    .await?;
    out.blob_volume_id = Some(blob_volume_id.clone());

    let db_volume_id = if spec.db_enabled {
        let db_disk_size_gb = spec
            .db_disk_size_gb
            .expect("validate() guarantees db_disk_size_gb is set when db_enabled");
        let db_disk_name = identity.db_disk_name();
        Some(
            disk::create_or_resize_disk(
                cmk,
                &db_disk_name,
                &catalog.disk_offering_id,
                &catalog.zone_id,
                db_disk_size_gb,
                db_vm_id.as_deref().expect("db_vm_id set when db_enabled"),
                &deploy_tag,
                "db disk (db)",
            )
            .await?,
        )
    } else {
        None
    };

    // 9. Snapshot policies.
    snapshot::ensure_snapshot_policy(
        cmk,
        &blob_volume_id,
        &catalog.all_zone_ids,
        &deploy_tag,
        "blob disk",
    )
    .await?;
    if let Some(db_vol) = &db_volume_id {
        snapshot::ensure_snapshot_policy(cmk, db_vol, &catalog.all_zone_ids, &deploy_tag, "db disk")
            .await?;
    }

    // 10. Internal IPs.
    out.web_internal_ip = Some(vm::vm_internal_ip(cmk, &web_vm_id).await?);
    let mut worker_internal_ips = Vec::new();
    for wid in &worker_vm_ids {
        worker_internal_ips.push(vm::vm_internal_ip(cmk, wid).await?);
    }
    if let Some(dbid) = &db_vm_id {
        out.db_internal_ip = Some(vm::vm_internal_ip(cmk, dbid).await?);
    }

    // 11. Output assembly.
    if spec.workers_enabled {
        out.worker_vm_ids = Some(worker_vm_ids);
        out.worker_ips = Some(worker_ips.into_iter().map(|ip| ip.ip_address).collect());
        out.worker_internal_ips = Some(worker_internal_ips);
    }
    if spec.db_enabled {
        out.db_vm_id = db_vm_id;
        if let Some(dip) = db_ip {
            out.db_ip = Some(dip.ip_address);
            out.db_ip_id = Some(dip.id);
        }
        out.db_volume_id = db_volume_id;
    }

    info!("provision complete");
    Ok(out)
}
