// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Describes the Diesel database schema.
//!
//! NOTE: Should be kept up-to-date with schema/dbinit.sql.

use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

table! {
    cluster (cluster_id) {
        cluster_id -> Int4,
        unique_id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        cloudaccount_id -> Text,
        provider_name -> Text,
        region_name -> Text,
        clusterstate_name -> Text,
        kubernetes_status -> Nullable<Jsonb>,
        created_date -> Timestamptz,
    }
}

table! {
    clusterrev (clusterrev_id) {
        clusterrev_id -> Int4,
        cluster_id -> Int4,
        desiredspec_json -> Jsonb,
        component_typegrp -> Text,
        component_typename -> Text,
        created_date -> Timestamptz,
        change_applied -> Bool,
    }
}

table! {
    cluster_extraconfig (cluster_id) {
        cluster_id -> Int4,
        encryptionkey_id -> Int4,
        nonce -> Text,
        cluster_cacrt -> Nullable<Text>,
        cluster_cakey -> Nullable<Text>,
        cluster_etcd_cacrt -> Nullable<Text>,
        cluster_etcd_cakey -> Nullable<Text>,
        cluster_etcd_rotation_keys -> Nullable<Text>,
        cluster_sa_pub -> Nullable<Text>,
        cluster_sa_key -> Nullable<Text>,
        cluster_cp_reg_cmd -> Nullable<Text>,
        cluster_wk_reg_cmd -> Nullable<Text>,
    }
}

table! {
    nodegroup (nodegroup_id) {
        nodegroup_id -> Int4,
        cluster_id -> Int4,
        unique_id -> Text,
        name -> Text,
        nodegrouptype_name -> Text,
        k8sversion_name -> Text,
        runtime_name -> Text,
        instancetype_name -> Text,
        osimageinstance_name -> Text,
        nodecount -> Int4,
        nodegroupstate_name -> Text,
        kubernetes_status -> Nullable<Jsonb>,
        createddate -> Timestamptz,
    }
}

table! {
    k8snode (k8snode_id) {
        k8snode_id -> Int4,
        k8snode_name -> Text,
        cluster_id -> Int4,
        nodegroup_id -> Int4,
        ip_address -> Text,
        k8snodestate_name -> Text,
        nodeprovider_name -> Nullable<Text>,
        osimageinstance_name -> Nullable<Text>,
        dns_name -> Nullable<Text>,
        kubernetes_status -> Nullable<Jsonb>,
        created_date -> Nullable<Timestamptz>,
        weka_storage_client_id -> Nullable<Text>,
        weka_storage_status -> Nullable<Text>,
        weka_storage_custom_status -> Nullable<Text>,
        weka_storage_message -> Nullable<Text>,
    }
}

table! {
    clusteraddonversion (cluster_id, addonversion_name) {
        cluster_id -> Int4,
        addonversion_name -> Text,
        install_type -> Text,
        artifact_repo -> Nullable<Text>,
        clusteraddonstate_name -> Text,
        kubernetes_status -> Nullable<Jsonb>,
        lastchangetimestamp -> Timestamptz,
    }
}

table! {
    vip (vip_id) {
        vip_id -> Int4,
        cluster_id -> Int4,
        viptype_name -> Text,
        vipstate_name -> Text,
        owner -> Text,
        vipprovider_name -> Text,
        vip_ip -> Nullable<Text>,
        vip_status -> Nullable<Jsonb>,
        firewall_status -> Nullable<Text>,
        sourceips -> Nullable<Jsonb>,
        created_date -> Timestamptz,
    }
}

table! {
    vipdetails (vip_id) {
        vip_id -> Int4,
        vip_name -> Text,
        description -> Nullable<Text>,
        port -> Int4,
        pool_name -> Text,
        pool_port -> Int4,
        pool_id -> Nullable<Int4>,
        protocol -> Nullable<Jsonb>,
    }
}

table! {
    storage (storage_id) {
        storage_id -> Int4,
        cluster_id -> Int4,
        storageprovider_name -> Text,
        size -> Text,
        storagestate_name -> Text,
        kubernetes_status -> Nullable<Jsonb>,
    }
}

table! {
    snapshot (snapshot_id) {
        snapshot_id -> Int4,
        cluster_id -> Int4,
        name -> Text,
        snapshotstate_name -> Text,
        created_date -> Timestamptz,
    }
}

// Reference data.  These tables are maintained outside of the control plane
// and only ever read here.

table! {
    k8sversion (k8sversion_name) {
        k8sversion_name -> Text,
        major_version -> Text,
        minor_version -> Text,
        provider_name -> Text,
        lifecyclestate_name -> Text,
    }
}

table! {
    k8scompatibility (
        provider_name,
        runtime_name,
        k8sversion_name,
        osimage_name,
        instancetype_name
    ) {
        provider_name -> Text,
        runtime_name -> Text,
        k8sversion_name -> Text,
        osimage_name -> Text,
        instancetype_name -> Text,
        cp_osimageinstance_name -> Text,
        wrk_osimageinstance_name -> Text,
        lifecyclestate_name -> Text,
    }
}

table! {
    osimageinstance (osimageinstance_name) {
        osimageinstance_name -> Text,
        osimage_name -> Text,
        k8sversion_name -> Text,
        nodegrouptype_name -> Text,
        provider_name -> Text,
        imiartifact -> Text,
        lifecyclestate_name -> Text,
    }
}

table! {
    instancetype (instancetype_name) {
        instancetype_name -> Text,
        nodeprovider_name -> Text,
        lifecyclestate_name -> Text,
    }
}

table! {
    defaultconfig (name) {
        name -> Text,
        value -> Text,
    }
}

table! {
    cloudaccountextraspec (cloudaccount_id) {
        cloudaccount_id -> Text,
        provider_name -> Nullable<Text>,
        active_account_create_cluster -> Bool,
        allow_create_storage -> Bool,
        maxclusters_override -> Nullable<Int4>,
        maxclusterng_override -> Nullable<Int4>,
        maxclusterilb_override -> Nullable<Int4>,
        maxclustervm_override -> Nullable<Int4>,
        maxnodegroupvm_override -> Nullable<Int4>,
    }
}

table! {
    addonversion (addonversion_name) {
        addonversion_name -> Text,
        name -> Text,
        install_type -> Text,
        artifact_repo -> Text,
        lifecyclestate_name -> Text,
    }
}

table! {
    addoncompatibilityk8s (addonversion_name, k8sversion_name) {
        addonversion_name -> Text,
        k8sversion_name -> Text,
    }
}

joinable!(clusterrev -> cluster (cluster_id));
joinable!(cluster_extraconfig -> cluster (cluster_id));
joinable!(nodegroup -> cluster (cluster_id));
joinable!(k8snode -> nodegroup (nodegroup_id));
joinable!(clusteraddonversion -> cluster (cluster_id));
joinable!(vip -> cluster (cluster_id));
joinable!(vipdetails -> vip (vip_id));
joinable!(storage -> cluster (cluster_id));
joinable!(snapshot -> cluster (cluster_id));
joinable!(addoncompatibilityk8s -> addonversion (addonversion_name));

allow_tables_to_appear_in_same_query!(
    cluster,
    clusterrev,
    cluster_extraconfig,
    nodegroup,
    k8snode,
    clusteraddonversion,
    vip,
    vipdetails,
    storage,
    snapshot,
    k8sversion,
    k8scompatibility,
    osimageinstance,
    instancetype,
    defaultconfig,
    cloudaccountextraspec,
    addonversion,
    addoncompatibilityk8s,
);
