//! End-to-end reconstruction through the public API.
//!
//! Coefficients are produced with the forward transforms of the crate and handed to a
//! `CodeBlockStore` the way an entropy decoder would, then read back through `J2kReconstructor`.

use std::sync::Arc;

use jpegexp_recon::jpeg2000::component_transform::{ComponentTransform, forward_rct, inverse_ict};
use jpegexp_recon::jpeg2000::dwt::{Dwt53, analyze_tree};
use jpegexp_recon::jpeg2000::subband::synthesis_tree;
use jpegexp_recon::{
    CodeBlockKey, CodeBlockStore, ColorMapping, DataKind, DecoderSpecs, ImageGeometry, J2kComponentInfo,
    J2kReconstructor, QuantizationParams, QuantizationType, ReconError, ReconstructedImage,
    ReconstructionOptions, TileContext, WaveletFilter,
};

/// Test pattern of component `c` at `(x, y)` on its own grid, full 8-bit range.
fn pattern(c: usize, x: u32, y: u32) -> i32 {
    ((x * 37 + y * 11 + (x * y) % 7 + c as u32 * 59) % 256) as i32
}

/// Centred planes of `pattern` covering every component image.
fn centred_planes(geometry: &ImageGeometry) -> Vec<Vec<i32>> {
    (0..geometry.num_components())
        .map(|c| {
            let rect = geometry.comp_image_rect(c, 0).unwrap();
            let mut plane = Vec::new();
            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    plane.push(pattern(c, x, y) - 128);
                }
            }
            plane
        })
        .collect()
}

/// Forward 5-3 decomposition of every tile-component of `planes`, stored as code-blocks.
fn encode_reversible(
    geometry: &ImageGeometry,
    specs: DecoderSpecs,
    planes: &[Vec<i32>],
) -> CodeBlockStore {
    let mut store = CodeBlockStore::new(geometry.clone(), Arc::new(specs.clone())).unwrap();
    let (ntx, nty) = geometry.num_tiles();
    let mut tmp = Vec::new();
    for ty in 0..nty {
        for tx in 0..ntx {
            let tile = TileContext {
                index: (ty * ntx + tx) as usize,
                x: tx,
                y: ty,
            };
            for (c, plane) in planes.iter().enumerate() {
                let comp = geometry.comp_image_rect(c, 0).unwrap();
                let rect = geometry.tile_comp_rect(tile, c).unwrap();
                let mut buf = Vec::with_capacity((rect.width() * rect.height()) as usize);
                for y in rect.y0..rect.y1 {
                    let start = ((y - comp.y0) * comp.width() + rect.x0 - comp.x0) as usize;
                    buf.extend_from_slice(&plane[start..start + rect.width() as usize]);
                }
                let tree = synthesis_tree(geometry, &specs, tile, c).unwrap();
                analyze_tree::<Dwt53>(&mut buf, rect.width() as usize, &tree, &mut tmp);
                store
                    .insert_tile_component(tile.index, c, &buf, false)
                    .unwrap();
            }
        }
    }
    store
}

fn int_sample(image: &ReconstructedImage, c: usize, x: u32, y: u32) -> i32 {
    let plane = &image.planes[c];
    let blk = plane.samples.as_int().unwrap();
    blk.get((x - plane.x0) as usize, (y - plane.y0) as usize)
}

/// Every sample of `image` equals `expected(c, x, y)`, coordinates on the component grids.
fn assert_image(image: &ReconstructedImage, expected: impl Fn(usize, u32, u32) -> i32) {
    for (c, plane) in image.planes.iter().enumerate() {
        for y in plane.y0..plane.y0 + plane.height {
            for x in plane.x0..plane.x0 + plane.width {
                assert_eq!(
                    int_sample(image, c, x, y),
                    expected(c, x, y),
                    "component {} at ({}, {})",
                    c,
                    x,
                    y
                );
            }
        }
    }
}

#[test]
fn test_flat_image_is_mid_grey() {
    let mut geometry = ImageGeometry::single_tile(24, 20, vec![J2kComponentInfo::new(8, false); 3]);
    geometry.tile_width = 16;
    geometry.tile_height = 16;
    let store = CodeBlockStore::new(geometry, Arc::new(DecoderSpecs::reversible(2, 8))).unwrap();
    assert!(store.is_empty());

    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    assert_eq!(recon.num_tiles(), (2, 2));
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_eq!((image.width, image.height), (24, 20));
    assert_eq!(image.component_count(), 3);
    assert_eq!(image.to_interleaved_u8().unwrap(), vec![128; 24 * 20 * 3]);
}

/// Lossless 5-3 coding over a tile grid that does not start at the image origin.
#[test]
fn test_lossless_multi_tile_with_offset_origin() {
    let mut geometry = ImageGeometry::single_tile(21, 13, vec![J2kComponentInfo::new(8, false)]);
    geometry.x_origin = 3;
    geometry.y_origin = 2;
    geometry.tile_width = 8;
    geometry.tile_height = 8;
    assert_eq!(geometry.num_tiles(), (3, 2));

    let specs = DecoderSpecs::reversible(2, 8);
    let store = encode_reversible(&geometry, specs, &centred_planes(&geometry));
    assert!(!store.is_empty());

    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_eq!((image.width, image.height), (21, 13));
    assert_eq!((image.planes[0].x0, image.planes[0].y0), (3, 2));
    assert_image(&image, pattern);

    let image = recon.decode_image(DataKind::Float).unwrap();
    let plane = &image.planes[0];
    let blk = plane.samples.as_float().unwrap();
    assert_eq!(blk.get(0, 0), pattern(0, 3, 2) as f32);
    assert_eq!(blk.get(20, 12), pattern(0, 23, 14) as f32);
}

#[test]
fn test_subsampled_component() {
    let comps = vec![
        J2kComponentInfo::new(8, false),
        J2kComponentInfo::new(8, false).with_subsampling(2, 2),
    ];
    let mut geometry = ImageGeometry::single_tile(16, 12, comps);
    geometry.x_origin = 1;
    geometry.y_origin = 1;
    geometry.tile_width = 17;
    geometry.tile_height = 13;

    let store = encode_reversible(&geometry, DecoderSpecs::reversible(2, 8), &centred_planes(&geometry));
    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_eq!((image.planes[0].width, image.planes[0].height), (16, 12));
    assert_eq!((image.planes[1].width, image.planes[1].height), (8, 6));
    assert_eq!((image.planes[1].x0, image.planes[1].y0), (1, 1));
    assert_image(&image, pattern);
}

#[test]
fn test_reduced_resolution_is_low_pass() {
    let geometry = ImageGeometry::single_tile(16, 16, vec![J2kComponentInfo::new(8, false)]);
    let planes = vec![vec![-28; 256]];
    let store = encode_reversible(&geometry, DecoderSpecs::reversible(3, 8), &planes);
    let options = ReconstructionOptions {
        resolution_level: Some(1),
        ..Default::default()
    };
    let mut recon = J2kReconstructor::new(store, options).unwrap();
    assert_eq!(recon.max_resolution_level(0).unwrap(), 3);
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_eq!((image.width, image.height), (4, 4));
    assert_eq!(image.planes[0].samples.as_int().unwrap().data, vec![100; 16]);
}

#[test]
fn test_reduced_resolution_needs_matching_tiles() {
    let mut geometry = ImageGeometry::single_tile(16, 8, vec![J2kComponentInfo::new(8, false)]);
    geometry.tile_width = 8;
    let mut specs = DecoderSpecs::reversible(2, 8);
    specs.decomposition_levels.set_tile_default(1, 1);
    let specs = Arc::new(specs);

    let store = CodeBlockStore::new(geometry.clone(), specs.clone()).unwrap();
    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_eq!((image.width, image.height), (16, 8));

    let store = CodeBlockStore::new(geometry, specs).unwrap();
    let options = ReconstructionOptions {
        resolution_level: Some(1),
        ..Default::default()
    };
    let mut recon = J2kReconstructor::new(store, options).unwrap();
    let err = recon.decode_image(DataKind::Int).unwrap_err();
    assert!(matches!(err, ReconError::InvalidGeometry(_)));
}

/// RGB coded with the reversible component transform comes back bit exact.
#[test]
fn test_rct_round_trip() {
    let geometry = ImageGeometry::single_tile(11, 9, vec![J2kComponentInfo::new(8, false); 3]);
    let mut specs = DecoderSpecs::reversible(2, 8);
    specs.component_transform.set_default(true);
    for c in 1..3 {
        specs.quant_params.set_comp_default(c, QuantizationParams::reversible(2, 9));
    }

    let rgb = centred_planes(&geometry);
    let mut ycc = vec![Vec::new(); 3];
    for i in 0..rgb[0].len() {
        let (y, cb, cr) = forward_rct(rgb[0][i], rgb[1][i], rgb[2][i]);
        ycc[0].push(y);
        ycc[1].push(cb);
        ycc[2].push(cr);
    }

    let store = encode_reversible(&geometry, specs.clone(), &ycc);
    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    assert_eq!(recon.component_transform(), ComponentTransform::Rct);
    assert_eq!(recon.data_kind(0).unwrap(), DataKind::Int);
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_image(&image, pattern);

    let store = encode_reversible(&geometry, specs, &ycc);
    let options = ReconstructionOptions {
        component_transform: false,
        ..Default::default()
    };
    let mut recon = J2kReconstructor::new(store, options).unwrap();
    assert_eq!(recon.component_transform(), ComponentTransform::None);
    let luma = recon.get_data(0, 2, DataKind::Int).unwrap();
    let expected: Vec<i32> = ycc[0].iter().map(|v| v + 128).collect();
    assert_eq!(luma.as_int().unwrap().data, expected);
}

fn irreversible_specs(levels: u8) -> DecoderSpecs {
    DecoderSpecs::new(
        WaveletFilter::Irreversible9x7,
        QuantizationType::Derived,
        QuantizationParams::derived(8, 1.0 / 256.0),
        levels,
    )
}

/// Coefficients of a tile-component whose only non-zero subband is the lowest LL.
fn dc_only(geometry: &ImageGeometry, specs: &DecoderSpecs, c: usize, value: i32) -> Vec<i32> {
    let tree = synthesis_tree(geometry, specs, TileContext::default(), c).unwrap();
    let levels = tree.info.res_level;
    let ll = tree.subband_by_idx(0, 0).unwrap().info;
    let scanw = tree.info.w as usize;
    let mut coefficients = vec![0; scanw * tree.info.h as usize];
    for y in 0..ll.h as usize {
        for x in 0..ll.w as usize {
            coefficients[y * scanw + x] = value;
        }
    }
    assert!(levels > 0);
    coefficients
}

#[test]
fn test_irreversible_dc_level() {
    let geometry = ImageGeometry::single_tile(9, 7, vec![J2kComponentInfo::new(8, false)]);
    let specs = irreversible_specs(2);
    let coefficients = dc_only(&geometry, &specs, 0, -28);
    let mut store = CodeBlockStore::new(geometry, Arc::new(specs)).unwrap();
    store.insert_tile_component(0, 0, &coefficients, true).unwrap();

    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    assert_eq!(recon.data_kind(0).unwrap(), DataKind::Float);

    let blk = recon.get_data(0, 2, DataKind::Float).unwrap();
    assert!(blk.progressive());
    for v in &blk.as_float().unwrap().data {
        assert!((v - 100.0).abs() < 1e-2, "got {}", v);
    }

    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_eq!(image.kind, DataKind::Int);
    assert_eq!(image.planes[0].samples.as_int().unwrap().data, vec![100; 63]);
}

#[test]
fn test_ict_dc_level() {
    let geometry = ImageGeometry::single_tile(8, 8, vec![J2kComponentInfo::new(8, false); 3]);
    let mut specs = irreversible_specs(1);
    specs.component_transform.set_default(true);
    let ycc = [20, -10, 6];
    let mut store = CodeBlockStore::new(geometry.clone(), Arc::new(specs.clone())).unwrap();
    for (c, &v) in ycc.iter().enumerate() {
        let coefficients = dc_only(&geometry, &specs, c, v);
        store.insert_tile_component(0, c, &coefficients, false).unwrap();
    }

    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    assert_eq!(recon.component_transform(), ComponentTransform::Ict);
    let (r, g, b) = inverse_ict(20.0, -10.0, 6.0);
    for (c, e) in [r, g, b].iter().enumerate() {
        let blk = recon.get_data(c, 1, DataKind::Float).unwrap();
        for v in &blk.as_float().unwrap().data {
            assert!((v - (e + 128.0)).abs() < 1e-2, "component {}: {} vs {}", c, v, e + 128.0);
        }
    }
}

/// Background coefficients shifted below the ROI planes are restored by the de-scaler.
#[test]
fn test_roi_max_shift() {
    const BOOST: u8 = 9;
    let geometry = ImageGeometry::single_tile(8, 8, vec![J2kComponentInfo::new(8, false)]);
    let mut specs = DecoderSpecs::reversible(0, 8);
    specs.roi_shift.set_default(Some(BOOST));
    let specs = Arc::new(specs);

    // 9 magnitude bits: guard bits plus the LL exponent, less one
    let magbits = 9u32;
    let mut data = Vec::new();
    for y in 0..8 {
        for x in 0..8 {
            let v = pattern(0, x, y) - 128;
            let mut magnitude = (v.unsigned_abs() << (31 - magbits)) as i32;
            if x >= 4 {
                magnitude >>= BOOST;
            }
            data.push(if v < 0 { i32::MIN | magnitude } else { magnitude });
        }
    }
    let key = CodeBlockKey {
        tile: 0,
        component: 0,
        res_level: 0,
        subband_idx: 0,
        m: 0,
        n: 0,
    };

    let mut store = CodeBlockStore::new(geometry.clone(), specs.clone()).unwrap();
    store.insert(key, data.clone(), false).unwrap();
    assert_eq!(store.len(), 1);
    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_image(&image, pattern);

    let mut store = CodeBlockStore::new(geometry, specs).unwrap();
    store.insert(key, data, false).unwrap();
    let options = ReconstructionOptions {
        roi_descaling: false,
        ..Default::default()
    };
    let mut recon = J2kReconstructor::new(store, options).unwrap();
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_image(&image, |c, x, y| if x >= 4 { 128 } else { pattern(c, x, y) });
}

#[test]
fn test_configuration_errors() {
    let geometry = ImageGeometry::single_tile(8, 8, vec![J2kComponentInfo::new(8, false); 3]);

    // 5-3 on the first two components, 9-7 on the third
    let mut specs = DecoderSpecs::reversible(1, 8);
    specs.component_transform.set_default(true);
    specs.filter.set_comp_default(2, WaveletFilter::Irreversible9x7);
    specs.quant_type.set_comp_default(2, QuantizationType::Derived);
    specs
        .quant_params
        .set_comp_default(2, QuantizationParams::derived(8, 1.0 / 256.0));
    let store = CodeBlockStore::new(geometry.clone(), Arc::new(specs)).unwrap();
    let err = J2kReconstructor::new(store, ReconstructionOptions::default()).err().unwrap();
    assert_eq!(err, ReconError::IncoherentComponentTransform { tile: 0 });
    assert!(err.is_configuration_error());

    let two = ImageGeometry::single_tile(8, 8, vec![J2kComponentInfo::new(8, false); 2]);
    let mut specs = DecoderSpecs::reversible(1, 8);
    specs.component_transform.set_default(true);
    let store = CodeBlockStore::new(two, Arc::new(specs)).unwrap();
    let err = J2kReconstructor::new(store, ReconstructionOptions::default()).err().unwrap();
    assert_eq!(err, ReconError::ComponentTransformNeedsThreeComponents(2));
    assert!(err.is_configuration_error());

    let mut specs = DecoderSpecs::reversible(1, 8);
    specs.filter.set_default(WaveletFilter::Irreversible9x7);
    let err = CodeBlockStore::new(geometry.clone(), Arc::new(specs)).unwrap_err();
    assert_eq!(
        err,
        ReconError::ReversibleQuantizationWithIrreversibleFilter {
            tile: 0,
            component: 0
        }
    );
    assert!(err.is_configuration_error());

    let store = CodeBlockStore::new(geometry, Arc::new(DecoderSpecs::reversible(1, 8))).unwrap();
    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    assert!(recon.get_data(0, 1, DataKind::Int).is_ok());
    let err = recon.next_tile().unwrap_err();
    assert_eq!(err, ReconError::NoMoreTiles);
    assert!(!err.is_configuration_error());
    assert_eq!(
        recon.set_tile(1, 0).unwrap_err(),
        ReconError::TileOutOfRange { x: 1, y: 0 }
    );
}

/// A tile with inconsistent header tables fails on entry and on every pull, without serving
/// the samples of the previous tile, until the caller moves to a valid tile.
#[test]
fn test_failed_tile_change_serves_no_stale_data() {
    let mut geometry = ImageGeometry::single_tile(16, 8, vec![J2kComponentInfo::new(8, false); 3]);
    geometry.tile_width = 8;
    let mut specs = DecoderSpecs::reversible(1, 8);
    specs.component_transform.set_tile_default(1, true);
    specs.filter.set_tile_comp(1, 2, WaveletFilter::Irreversible9x7);
    specs.quant_type.set_tile_comp(1, 2, QuantizationType::Derived);
    specs
        .quant_params
        .set_tile_comp(1, 2, QuantizationParams::derived(8, 1.0 / 256.0));

    let coefficients = dc_only(&geometry, &specs, 0, 40);
    let mut store = CodeBlockStore::new(geometry, Arc::new(specs)).unwrap();
    store.insert_tile_component(0, 0, &coefficients, false).unwrap();

    let mut recon = J2kReconstructor::new(store, ReconstructionOptions::default()).unwrap();
    let blk = recon.get_data(0, 1, DataKind::Int).unwrap();
    assert_eq!(blk.as_int().unwrap().data, vec![168; 64]);

    let incoherent = ReconError::IncoherentComponentTransform { tile: 1 };
    assert_eq!(recon.next_tile().unwrap_err(), incoherent);
    assert_eq!(recon.tile().index, 1);
    for c in 0..3 {
        assert_eq!(recon.get_data(c, 1, DataKind::Int).unwrap_err(), incoherent);
    }
    assert_eq!(recon.data_kind(0).unwrap_err(), incoherent);
    assert_eq!(recon.set_tile(1, 0).unwrap_err(), incoherent);

    recon.set_tile(0, 0).unwrap();
    let blk = recon.get_data(0, 1, DataKind::Int).unwrap();
    assert_eq!(blk.as_int().unwrap().data, vec![168; 64]);
}

/// sYCC with 2:1 chroma: the chroma planes are replicated onto the luma grid before mapping.
#[test]
fn test_sycc_with_subsampled_chroma() {
    let comps = vec![
        J2kComponentInfo::new(8, false),
        J2kComponentInfo::new(8, false).with_subsampling(2, 2),
        J2kComponentInfo::new(8, false).with_subsampling(2, 2),
    ];
    let geometry = ImageGeometry::single_tile(8, 8, comps);
    let cr = |x: u32, y: u32| pattern(2, x, y) % 32 - 16;
    let luma: Vec<i32> = (0..64).map(|i| pattern(0, i % 8, i / 8) - 128).collect();
    let chroma_red: Vec<i32> = (0..16).map(|i| cr(i % 4, i / 4)).collect();
    let planes = vec![luma, vec![0; 16], chroma_red];
    let store = encode_reversible(&geometry, DecoderSpecs::reversible(1, 8), &planes);

    let options = ReconstructionOptions {
        color_mapping: ColorMapping::SYcc,
        ..Default::default()
    };
    let mut recon = J2kReconstructor::new(store, options).unwrap();
    assert_eq!(recon.tile_comp_rect(1, 1).unwrap(), geometry.image_rect());
    let image = recon.decode_image(DataKind::Int).unwrap();
    for plane in &image.planes {
        assert_eq!((plane.width, plane.height), (8, 8));
    }
    assert_image(&image, |c, x, y| {
        let l = (pattern(0, x, y) - 128) as f32;
        let v = cr(x / 2, y / 2) as f32;
        let mapped = match c {
            0 => l + 1.402 * v,
            1 => l - 0.71414 * v,
            _ => l,
        };
        mapped as i32 + 128
    });

    let store = CodeBlockStore::new(geometry.clone(), Arc::new(DecoderSpecs::reversible(1, 8))).unwrap();
    let mut quarter = geometry;
    quarter.components[1] = quarter.components[1].with_subsampling(4, 4);
    let store_quarter = CodeBlockStore::new(quarter, Arc::new(DecoderSpecs::reversible(1, 8))).unwrap();
    assert!(J2kReconstructor::new(store, options).is_ok());
    let err = J2kReconstructor::new(store_quarter, options).err().unwrap();
    assert_eq!(
        err,
        ReconError::UnsupportedResampling {
            component: 1,
            dx: 4,
            dy: 4
        }
    );
}

/// sYCC over components decoded on different sample paths, without a component transform.
#[test]
fn test_sycc_with_mixed_filters() {
    let geometry = ImageGeometry::single_tile(8, 8, vec![J2kComponentInfo::new(8, false); 3]);
    let mut specs = DecoderSpecs::reversible(1, 8);
    specs.filter.set_comp_default(2, WaveletFilter::Irreversible9x7);
    specs.quant_type.set_comp_default(2, QuantizationType::Derived);
    specs
        .quant_params
        .set_comp_default(2, QuantizationParams::derived(8, 1.0 / 256.0));

    let mut store = CodeBlockStore::new(geometry.clone(), Arc::new(specs.clone())).unwrap();
    for (c, v) in [(0, 20), (2, 6)] {
        let coefficients = dc_only(&geometry, &specs, c, v);
        store.insert_tile_component(0, c, &coefficients, false).unwrap();
    }

    let options = ReconstructionOptions {
        color_mapping: ColorMapping::SYcc,
        ..Default::default()
    };
    let mut recon = J2kReconstructor::new(store, options).unwrap();
    assert_eq!(recon.component_transform(), ComponentTransform::None);
    assert_eq!(recon.data_kind(0).unwrap(), DataKind::Float);

    let expected = [20.0 + 1.402 * 6.0, 20.0 - 0.71414 * 6.0, 20.0];
    for (c, e) in expected.iter().enumerate() {
        let blk = recon.get_data(c, 1, DataKind::Float).unwrap();
        for v in &blk.as_float().unwrap().data {
            assert!((v - (e + 128.0)).abs() < 1e-2, "component {}: {} vs {}", c, v, e + 128.0);
        }
    }
    let image = recon.decode_image(DataKind::Int).unwrap();
    assert_eq!(image.planes[2].samples.as_int().unwrap().data, vec![148; 64]);
}
